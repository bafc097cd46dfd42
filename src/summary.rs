//! Cohort-wide analytical summary queries backing the CLI summary view.

use crate::db::Pool;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WorkoutTypeSummary {
    pub workout_type: Option<String>,
    pub avg_calories: Option<f64>,
    pub avg_duration: Option<f64>,
    pub sessions: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeficitEntry {
    pub user_id: i64,
    pub gender: Option<String>,
    pub age: Option<f64>,
    pub cal_balance: Option<f64>,
    pub session_duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MacroAverages {
    pub carbs: Option<f64>,
    pub proteins: Option<f64>,
    pub fats: Option<f64>,
    pub calories: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EfficiencyEntry {
    pub workout_type: Option<String>,
    pub avg_efficiency: Option<f64>,
    pub avg_focus: Option<f64>,
    pub avg_recovery: Option<f64>,
}

/// Average calories burned per workout type, highest first.
pub async fn calories_by_workout_type(
    pool: &Pool,
) -> Result<Vec<WorkoutTypeSummary>, sqlx::Error> {
    sqlx::query_as::<_, WorkoutTypeSummary>(
        "SELECT workout_type, \
                ROUND(AVG(calories_burned), 2) AS avg_calories, \
                ROUND(AVG(session_duration), 2) AS avg_duration, \
                COUNT(*) AS sessions \
         FROM workouts \
         GROUP BY workout_type \
         ORDER BY avg_calories DESC \
         LIMIT 5",
    )
    .fetch_all(pool)
    .await
}

/// Users with the deepest caloric deficit.
pub async fn top_caloric_deficit(pool: &Pool) -> Result<Vec<DeficitEntry>, sqlx::Error> {
    sqlx::query_as::<_, DeficitEntry>(
        "SELECT u.user_id, \
                u.gender, \
                ROUND(u.age, 1) AS age, \
                ROUND(d.cal_balance, 2) AS cal_balance, \
                ROUND(w.session_duration, 2) AS session_duration \
         FROM derived_metrics d \
         JOIN users u ON u.user_id = d.user_id \
         JOIN workouts w ON w.user_id = u.user_id \
         WHERE d.cal_balance IS NOT NULL \
         ORDER BY d.cal_balance ASC \
         LIMIT 5",
    )
    .fetch_all(pool)
    .await
}

/// Cohort-wide macro intake averages.
pub async fn macro_averages(pool: &Pool) -> Result<Option<MacroAverages>, sqlx::Error> {
    sqlx::query_as::<_, MacroAverages>(
        "SELECT ROUND(AVG(carbs), 2) AS carbs, \
                ROUND(AVG(proteins), 2) AS proteins, \
                ROUND(AVG(fats), 2) AS fats, \
                ROUND(AVG(calories), 2) AS calories \
         FROM nutrition",
    )
    .fetch_optional(pool)
    .await
}

/// Training efficiency, focus, and recovery per workout type.
pub async fn efficiency_by_workout_type(
    pool: &Pool,
) -> Result<Vec<EfficiencyEntry>, sqlx::Error> {
    sqlx::query_as::<_, EfficiencyEntry>(
        "SELECT w.workout_type, \
                ROUND(AVG(wa.training_efficiency), 2) AS avg_efficiency, \
                ROUND(AVG(wa.muscle_focus_score), 2) AS avg_focus, \
                ROUND(AVG(wa.recovery_index), 2) AS avg_recovery \
         FROM workouts w \
         JOIN workout_analysis wa ON w.user_id = wa.user_id \
         WHERE wa.training_efficiency IS NOT NULL \
         GROUP BY w.workout_type \
         ORDER BY avg_efficiency DESC \
         LIMIT 5",
    )
    .fetch_all(pool)
    .await
}
