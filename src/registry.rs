//! Query registry and template administration.
//!
//! Placeholder queries and report templates live in the database (`queries`
//! and `templates` tables). The built-in defaults below are the seed content;
//! seeding queries replaces the table wholesale, while seeding templates
//! upserts by current or legacy name so manually tweaked bodies get refreshed
//! rather than duplicated.

use crate::db::Pool;
use crate::model::Template;
use sqlx::Row;
use std::collections::HashMap;
use tracing::instrument;

/// Immutable snapshot of the `queries` table, keyed by placeholder name.
///
/// A renderer loads one snapshot and uses it for every placeholder of a
/// render call; replacing the active set is an explicit reload, never ambient
/// mutation.
#[derive(Debug, Clone, Default)]
pub struct QueryRegistry {
    entries: HashMap<String, String>,
}

impl QueryRegistry {
    #[instrument(skip_all)]
    pub async fn load(pool: &Pool) -> Result<Self, sqlx::Error> {
        let rows = sqlx::query("SELECT query_key, query_sql FROM queries")
            .fetch_all(pool)
            .await?;
        let entries = rows
            .into_iter()
            .map(|row| (row.get("query_key"), row.get("query_sql")))
            .collect();
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// List all registered placeholder queries as `(key, sql)` pairs.
pub async fn list_queries(pool: &Pool) -> Result<Vec<(String, String)>, sqlx::Error> {
    let rows = sqlx::query("SELECT query_key, query_sql FROM queries ORDER BY query_key")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("query_key"), row.get("query_sql")))
        .collect())
}

/// Replace the whole `queries` table with the given set, atomically.
#[instrument(skip_all, fields(entries = entries.len()))]
pub async fn replace_queries(
    pool: &Pool,
    entries: &[(&str, &str)],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM queries").execute(&mut *tx).await?;
    for (key, sql) in entries {
        sqlx::query("INSERT INTO queries (query_key, query_sql) VALUES (?, ?)")
            .bind(*key)
            .bind(*sql)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Replace the `queries` table with the built-in default set.
pub async fn seed_queries(pool: &Pool) -> Result<(), sqlx::Error> {
    replace_queries(pool, DEFAULT_QUERIES).await
}

/// Seed default queries only when the table is empty.
pub async fn seed_queries_if_empty(pool: &Pool) -> Result<(), sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queries")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }
    seed_queries(pool).await
}

pub async fn list_templates(pool: &Pool) -> Result<Vec<Template>, sqlx::Error> {
    sqlx::query_as::<_, Template>(
        "SELECT template_id, template_name, template_text, created_at FROM templates ORDER BY template_id",
    )
    .fetch_all(pool)
    .await
}

pub async fn get_template(pool: &Pool, template_id: i64) -> Result<Option<Template>, sqlx::Error> {
    sqlx::query_as::<_, Template>(
        "SELECT template_id, template_name, template_text, created_at FROM templates WHERE template_id = ?",
    )
    .bind(template_id)
    .fetch_optional(pool)
    .await
}

/// Upsert the built-in templates: bodies are refreshed in place when a row
/// matches the current or legacy name, otherwise inserted. Runs in one
/// transaction.
#[instrument(skip_all)]
pub async fn seed_templates(pool: &Pool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for tpl in DEFAULT_TEMPLATES {
        let updated = sqlx::query(
            "UPDATE templates SET template_name = ?, template_text = ? WHERE template_name IN (?, ?)",
        )
        .bind(tpl.name)
        .bind(tpl.body)
        .bind(tpl.name)
        .bind(tpl.legacy_name)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO templates (template_name, template_text) VALUES (?, ?)")
                .bind(tpl.name)
                .bind(tpl.body)
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

/// Seed default templates only when the table is empty.
pub async fn seed_templates_if_empty(pool: &Pool) -> Result<(), sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM templates")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }
    seed_templates(pool).await
}

pub struct DefaultTemplate {
    pub name: &'static str,
    pub legacy_name: &'static str,
    pub body: &'static str,
}

pub const DEFAULT_TEMPLATES: &[DefaultTemplate] = &[
    DefaultTemplate {
        name: "Weight & Body Composition",
        legacy_name: "Body Composition Overview",
        body: "Average weight {weight} kg at {height} m gives a BMI of {bmi}.\nBody fat sits at {fat_percentage}% with {lean_mass_kg} kg of lean mass, outlining the current composition.",
    },
    DefaultTemplate {
        name: "Heart Rate & Recovery",
        legacy_name: "Heart Health Snapshot",
        body: "Average training heart rate is {avg_bpm} bpm with peaks of {max_bpm} bpm and a resting rate of {resting_bpm} bpm.\nCombined with a BMI of {bmi}, cardio load and weight management stay in a manageable range.",
    },
    DefaultTemplate {
        name: "Nutrition, Hydration & Meals",
        legacy_name: "Macro Intake",
        body: "{daily_meals_frequency} meals per day, mostly {meal_type}.\nIntake averages {carbs} g carbs, {protein} g protein and {fat} g fat for {calories_intake} kcal total, with {sugar_g} g sugar and {sodium_mg} mg sodium.\nHydration of {water_intake} liters supports training and recovery.",
    },
    DefaultTemplate {
        name: "Training Rhythm & Frequency",
        legacy_name: "Calorie Burn Expectation Comparison",
        body: "{workout_frequency} sessions per week at around {duration} hours each.\nThe typical {workout_type} session runs {avg_bpm} bpm (peaking at {max_bpm}), and the most popular type lasts {avg_duration} hours, which helps plan intensity and rest.",
    },
    DefaultTemplate {
        name: "Cohort & Equipment Plan",
        legacy_name: "Gender-Based Workout Recommendation",
        body: "The cohort skews {gender} and most often trains {workout_type}.\nRecommended movement: {name_of_exercise} at {difficulty_level} level, {sets} sets of {reps} reps using {equipment_needed}, targeting the {target_muscle_group}.",
    },
    DefaultTemplate {
        name: "Cardiovascular Health",
        legacy_name: "Cardiovascular Health Assessment",
        body: "Resting heart rate is {resting_bpm} bpm with {pct_hrr}% of heart-rate reserve in use.\nCardiovascular health level: {cardiovascular_level}.",
    },
    DefaultTemplate {
        name: "Protein Intake per Body Weight",
        legacy_name: "Protein per Kilogram Review",
        body: "Protein intake is {protein} g at a body weight of {weight} kg, or {protein_per_kg} g per kg.\nFor a {weight_goal} goal the suggestion is: {calorie_recommendation}.",
    },
];

/// Built-in placeholder queries. Each is expected to yield at most one row
/// with the value in a column aliased `val` (or as the first column).
pub const DEFAULT_QUERIES: &[(&str, &str)] = &[
    ("avg_bpm", "SELECT ROUND(AVG(avg_bpm), 2) AS val FROM workouts"),
    ("max_bpm", "SELECT ROUND(MAX(max_bpm), 2) AS val FROM workouts"),
    ("resting_bpm", "SELECT ROUND(AVG(resting_bpm), 2) AS val FROM workouts"),
    ("cal_burned", "SELECT ROUND(SUM(calories_burned), 2) AS val FROM workouts"),
    (
        "avg_calories",
        "SELECT ROUND(AVG(calories_burned), 2) AS val FROM workouts \
         WHERE workout_type = (SELECT workout_type FROM workouts GROUP BY workout_type ORDER BY COUNT(*) DESC LIMIT 1)",
    ),
    ("bmi", "SELECT ROUND(AVG(bmi), 2) AS val FROM users"),
    (
        "cal_balance",
        "SELECT ROUND(cal_balance, 2) AS val FROM workout_analysis \
         WHERE user_id = (SELECT user_id FROM workout_analysis ORDER BY cal_balance ASC LIMIT 1) LIMIT 1",
    ),
    (
        "workout_type",
        "SELECT workout_type AS val FROM workouts GROUP BY workout_type ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    ("duration", "SELECT ROUND(AVG(session_duration), 2) AS val FROM workouts"),
    (
        "avg_duration",
        "SELECT ROUND(AVG(session_duration), 2) AS val FROM workouts \
         WHERE workout_type = (SELECT workout_type FROM workouts GROUP BY workout_type ORDER BY COUNT(*) DESC LIMIT 1)",
    ),
    ("protein", "SELECT ROUND(AVG(proteins), 2) AS val FROM nutrition"),
    ("carbs", "SELECT ROUND(AVG(carbs), 2) AS val FROM nutrition"),
    ("fat", "SELECT ROUND(AVG(fats), 2) AS val FROM nutrition"),
    ("calories_intake", "SELECT ROUND(AVG(calories), 2) AS val FROM nutrition"),
    ("water_intake", "SELECT ROUND(AVG(water_intake), 2) AS val FROM users"),
    ("fat_percentage", "SELECT ROUND(AVG(fat_percentage), 2) AS val FROM users"),
    ("lean_mass_kg", "SELECT ROUND(AVG(lean_mass_kg), 2) AS val FROM users"),
    ("weight", "SELECT ROUND(AVG(weight), 2) AS val FROM users"),
    ("height", "SELECT ROUND(AVG(height), 2) AS val FROM users"),
    ("age", "SELECT ROUND(AVG(age), 2) AS val FROM users"),
    (
        "gender",
        "SELECT gender AS val FROM users WHERE gender IS NOT NULL AND gender != '' \
         GROUP BY gender ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "experience_level",
        "SELECT experience_level AS val FROM users GROUP BY experience_level ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "session_duration",
        "SELECT ROUND(session_duration, 2) AS val FROM workouts \
         WHERE user_id = (SELECT user_id FROM workout_analysis ORDER BY cal_balance ASC LIMIT 1) \
         ORDER BY calories_burned DESC LIMIT 1",
    ),
    ("training_efficiency", "SELECT ROUND(AVG(training_efficiency), 2) AS val FROM workout_analysis"),
    ("muscle_focus_score", "SELECT ROUND(AVG(muscle_focus_score), 2) AS val FROM workout_analysis"),
    ("recovery_index", "SELECT ROUND(AVG(recovery_index), 2) AS val FROM workout_analysis"),
    ("workout_frequency", "SELECT ROUND(AVG(workout_frequency), 2) AS val FROM users"),
    ("daily_meals_frequency", "SELECT ROUND(AVG(daily_meals_frequency), 2) AS val FROM nutrition"),
    ("sets", "SELECT ROUND(AVG(sets), 2) AS val FROM workouts"),
    ("reps", "SELECT ROUND(AVG(reps), 2) AS val FROM workouts"),
    (
        "name_of_exercise",
        "SELECT name_of_exercise AS val FROM workouts GROUP BY name_of_exercise ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "target_muscle_group",
        "SELECT target_muscle_group AS val FROM workouts GROUP BY target_muscle_group ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "equipment_needed",
        "SELECT equipment_needed AS val FROM workouts GROUP BY equipment_needed ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "difficulty_level",
        "SELECT difficulty_level AS val FROM workouts GROUP BY difficulty_level ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "body_part",
        "SELECT body_part AS val FROM workouts GROUP BY body_part ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "type_of_muscle",
        "SELECT type_of_muscle AS val FROM workout_analysis GROUP BY type_of_muscle ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "meal_name",
        "SELECT meal_name AS val FROM nutrition WHERE meal_name IS NOT NULL AND meal_name != '' \
         GROUP BY meal_name ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "meal_type",
        "SELECT meal_type AS val FROM nutrition GROUP BY meal_type ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "diet_type",
        "SELECT diet_type AS val FROM nutrition GROUP BY diet_type ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    (
        "cooking_method",
        "SELECT cooking_method AS val FROM nutrition WHERE cooking_method IS NOT NULL AND cooking_method != '' \
         GROUP BY cooking_method ORDER BY COUNT(*) DESC LIMIT 1",
    ),
    ("pct_hrr", "SELECT ROUND(AVG(pct_hrr), 2) AS val FROM workout_analysis"),
    ("pct_maxhr", "SELECT ROUND(AVG(pct_maxhr), 2) AS val FROM workout_analysis"),
    ("expected_burn", "SELECT ROUND(AVG(expected_burn), 2) AS val FROM workout_analysis"),
    (
        "training_zone",
        "SELECT CASE \
            WHEN AVG(pct_maxhr) < 0.6 THEN 'recovery zone' \
            WHEN AVG(pct_maxhr) BETWEEN 0.6 AND 0.7 THEN 'fat-burn zone' \
            WHEN AVG(pct_maxhr) BETWEEN 0.7 AND 0.8 THEN 'aerobic zone' \
            WHEN AVG(pct_maxhr) BETWEEN 0.8 AND 0.9 THEN 'anaerobic zone' \
            ELSE 'maximal zone' \
         END AS val FROM workout_analysis",
    ),
    (
        "training_benefit",
        "SELECT CASE \
            WHEN AVG(pct_maxhr) < 0.7 THEN 'fat burning and recovery' \
            WHEN AVG(pct_maxhr) BETWEEN 0.7 AND 0.8 THEN 'cardiovascular health' \
            WHEN AVG(pct_maxhr) BETWEEN 0.8 AND 0.9 THEN 'endurance gains' \
            ELSE 'peak performance' \
         END AS val FROM workout_analysis",
    ),
    (
        "cardiovascular_level",
        "SELECT CASE \
            WHEN AVG(u.resting_bpm) < 60 AND AVG(wa.pct_hrr) > 0.7 THEN 'excellent' \
            WHEN AVG(u.resting_bpm) < 70 AND AVG(wa.pct_hrr) > 0.6 THEN 'good' \
            WHEN AVG(u.resting_bpm) < 80 AND AVG(wa.pct_hrr) > 0.5 THEN 'fair' \
            ELSE 'needs improvement' \
         END AS val \
         FROM users u JOIN workout_analysis wa ON u.user_id = wa.user_id \
         WHERE u.resting_bpm IS NOT NULL AND wa.pct_hrr IS NOT NULL",
    ),
    (
        "weight_goal",
        "SELECT CASE \
            WHEN AVG(cal_balance) < -500 THEN 'weight loss' \
            WHEN AVG(cal_balance) BETWEEN -500 AND 500 THEN 'maintenance' \
            ELSE 'weight gain' \
         END AS val FROM workout_analysis",
    ),
    (
        "calorie_recommendation",
        "SELECT CASE \
            WHEN AVG(cal_balance) < -500 THEN 'add 200-300 kcal of daily intake' \
            WHEN AVG(cal_balance) BETWEEN -500 AND 500 THEN 'keep the current intake level' \
            ELSE 'consider cutting 300-500 kcal of daily intake' \
         END AS val FROM workout_analysis",
    ),
    (
        "suggested_reps",
        "SELECT CASE \
            WHEN AVG(reps) < 8 THEN CAST(AVG(reps) + 2 AS TEXT) \
            WHEN AVG(reps) BETWEEN 8 AND 12 THEN CAST(AVG(reps) + 1 AS TEXT) \
            ELSE 'keep the rep count and add load' \
         END AS val FROM workouts",
    ),
    (
        "protein_per_kg",
        "SELECT ROUND(AVG(proteins / weight), 2) AS val FROM nutrition n JOIN users u ON n.user_id = u.user_id",
    ),
    ("sugar_g", "SELECT ROUND(AVG(sugar_g), 2) AS val FROM nutrition"),
    ("sodium_mg", "SELECT ROUND(AVG(sodium_mg), 2) AS val FROM nutrition"),
    ("cholesterol_mg", "SELECT ROUND(AVG(cholesterol_mg), 2) AS val FROM nutrition"),
    ("serving_size_g", "SELECT ROUND(AVG(serving_size_g), 2) AS val FROM nutrition"),
    ("prep_time_min", "SELECT ROUND(AVG(prep_time_min), 2) AS val FROM nutrition"),
    ("cook_time_min", "SELECT ROUND(AVG(cook_time_min), 2) AS val FROM nutrition"),
    ("rating", "SELECT ROUND(AVG(rating), 2) AS val FROM nutrition"),
    ("burns_calories_per_30min", "SELECT ROUND(AVG(burns_calories_per_30min), 2) AS val FROM workout_analysis"),
    (
        "expected_burn_user",
        "SELECT ROUND(expected_burn, 2) AS val FROM workout_analysis \
         WHERE user_id = (SELECT user_id FROM workout_analysis ORDER BY expected_burn DESC LIMIT 1)",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn seed_and_load_registry() {
        let pool = setup_pool().await;
        seed_queries(&pool).await.unwrap();

        let registry = QueryRegistry::load(&pool).await.unwrap();
        assert_eq!(registry.len(), DEFAULT_QUERIES.len());
        assert!(registry.get("bmi").unwrap().contains("FROM users"));
        assert!(registry.get("no_such_key").is_none());
    }

    #[tokio::test]
    async fn replace_queries_is_wholesale() {
        let pool = setup_pool().await;
        seed_queries(&pool).await.unwrap();
        replace_queries(&pool, &[("only_key", "SELECT 1 AS val")])
            .await
            .unwrap();

        let entries = list_queries(&pool).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "only_key");
    }

    #[tokio::test]
    async fn seed_queries_if_empty_keeps_existing() {
        let pool = setup_pool().await;
        replace_queries(&pool, &[("custom", "SELECT 2 AS val")])
            .await
            .unwrap();
        seed_queries_if_empty(&pool).await.unwrap();

        let registry = QueryRegistry::load(&pool).await.unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("custom").is_some());
    }

    #[tokio::test]
    async fn seed_templates_upserts_by_legacy_name() {
        let pool = setup_pool().await;
        sqlx::query("INSERT INTO templates (template_name, template_text) VALUES (?, ?)")
            .bind("Body Composition Overview")
            .bind("old body")
            .execute(&pool)
            .await
            .unwrap();

        seed_templates(&pool).await.unwrap();
        let templates = list_templates(&pool).await.unwrap();
        assert_eq!(templates.len(), DEFAULT_TEMPLATES.len());

        // The legacy row was renamed in place, not duplicated.
        let renamed = templates
            .iter()
            .find(|t| t.template_name == "Weight & Body Composition")
            .unwrap();
        assert!(renamed.template_text.contains("{bmi}"));
        assert_eq!(renamed.template_id, 1);
    }

    #[tokio::test]
    async fn seed_templates_twice_is_idempotent() {
        let pool = setup_pool().await;
        seed_templates(&pool).await.unwrap();
        seed_templates(&pool).await.unwrap();
        assert_eq!(
            list_templates(&pool).await.unwrap().len(),
            DEFAULT_TEMPLATES.len()
        );
    }

    #[tokio::test]
    async fn get_template_by_id() {
        let pool = setup_pool().await;
        seed_templates(&pool).await.unwrap();
        let tpl = get_template(&pool, 1).await.unwrap().unwrap();
        assert_eq!(tpl.template_id, 1);
        assert!(get_template(&pool, 999).await.unwrap().is_none());
    }
}
