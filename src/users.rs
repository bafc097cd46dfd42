//! User CRUD and per-user statistics.

use crate::db::{self, Pool, SqlParam};
use serde::Serialize;
use sqlx::Row;
use tracing::instrument;

const PROFILE_COLUMNS: &str = "SELECT user_id, age, gender, weight, height, bmi, \
     fat_percentage, lean_mass_kg, workout_frequency, water_intake, resting_bpm FROM users";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserProfile {
    pub user_id: i64,
    pub age: Option<f64>,
    pub gender: Option<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub fat_percentage: Option<f64>,
    pub lean_mass_kg: Option<f64>,
    pub workout_frequency: Option<f64>,
    pub water_intake: Option<f64>,
    pub resting_bpm: Option<f64>,
}

/// Optional field set for create/update; only the populated fields reach SQL.
#[derive(Debug, Clone, Default)]
pub struct UserFields {
    pub age: Option<f64>,
    pub gender: Option<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub fat_percentage: Option<f64>,
    pub lean_mass_kg: Option<f64>,
    pub workout_frequency: Option<f64>,
    pub water_intake: Option<f64>,
    pub resting_bpm: Option<f64>,
}

impl UserFields {
    fn pairs(&self) -> Vec<(&'static str, SqlParam)> {
        let mut out = Vec::new();
        if let Some(v) = self.age {
            out.push(("age", SqlParam::Real(v)));
        }
        if let Some(v) = &self.gender {
            out.push(("gender", SqlParam::Text(v.clone())));
        }
        if let Some(v) = self.weight {
            out.push(("weight", SqlParam::Real(v)));
        }
        if let Some(v) = self.height {
            out.push(("height", SqlParam::Real(v)));
        }
        if let Some(v) = self.bmi {
            out.push(("bmi", SqlParam::Real(v)));
        }
        if let Some(v) = self.fat_percentage {
            out.push(("fat_percentage", SqlParam::Real(v)));
        }
        if let Some(v) = self.lean_mass_kg {
            out.push(("lean_mass_kg", SqlParam::Real(v)));
        }
        if let Some(v) = self.workout_frequency {
            out.push(("workout_frequency", SqlParam::Real(v)));
        }
        if let Some(v) = self.water_intake {
            out.push(("water_intake", SqlParam::Real(v)));
        }
        if let Some(v) = self.resting_bpm {
            out.push(("resting_bpm", SqlParam::Real(v)));
        }
        out
    }

    fn fill_bmi(&mut self, weight: Option<f64>, height: Option<f64>) {
        if self.bmi.is_some() {
            return;
        }
        if let (Some(w), Some(h)) = (weight, height) {
            if h > 0.0 {
                self.bmi = Some(w / (h * h));
            }
        }
    }
}

pub async fn get_user(pool: &Pool, user_id: i64) -> Result<Option<UserProfile>, sqlx::Error> {
    let sql = format!("{PROFILE_COLUMNS} WHERE user_id = ?");
    sqlx::query_as::<_, UserProfile>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<i64>,
    pub offset: i64,
    /// Substring match against `gender`.
    pub search: Option<String>,
    pub order_desc: bool,
}

pub async fn list_users(pool: &Pool, opts: &ListOptions) -> Result<Vec<UserProfile>, sqlx::Error> {
    let mut sql = String::from(PROFILE_COLUMNS);
    if opts.search.is_some() {
        sql.push_str(" WHERE gender LIKE ?");
    }
    sql.push_str(" ORDER BY user_id ");
    sql.push_str(if opts.order_desc { "DESC" } else { "ASC" });
    if opts.limit.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
    }

    let mut query = sqlx::query_as::<_, UserProfile>(&sql);
    if let Some(search) = &opts.search {
        query = query.bind(format!("%{search}%"));
    }
    if let Some(limit) = opts.limit {
        query = query.bind(limit).bind(opts.offset);
    }
    query.fetch_all(pool).await
}

/// Insert a user; BMI is derived from weight and height when not given.
/// Returns the new user id.
#[instrument(skip_all)]
pub async fn create_user(pool: &Pool, mut fields: UserFields) -> Result<i64, sqlx::Error> {
    fields.fill_bmi(fields.weight, fields.height);

    let pairs = fields.pairs();
    if pairs.is_empty() {
        // Empty record still allocates a user id.
        let row = sqlx::query("INSERT INTO users DEFAULT VALUES RETURNING user_id")
            .fetch_one(pool)
            .await?;
        return Ok(row.get("user_id"));
    }

    let columns: Vec<&str> = pairs.iter().map(|(c, _)| *c).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO users ({}) VALUES ({}) RETURNING user_id",
        columns.join(", "),
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for (_, param) in &pairs {
        query = db::bind_param(query, param);
    }
    let row = query.fetch_one(pool).await?;
    Ok(row.get("user_id"))
}

/// Update the given fields; BMI is recomputed when weight or height change
/// without an explicit BMI. Returns false when the user does not exist or no
/// fields were given.
#[instrument(skip_all, fields(user_id = user_id))]
pub async fn update_user(
    pool: &Pool,
    user_id: i64,
    mut fields: UserFields,
) -> Result<bool, sqlx::Error> {
    let Some(current) = get_user(pool, user_id).await? else {
        return Ok(false);
    };
    if fields.weight.is_some() || fields.height.is_some() {
        fields.fill_bmi(
            fields.weight.or(current.weight),
            fields.height.or(current.height),
        );
    }

    let pairs = fields.pairs();
    if pairs.is_empty() {
        return Ok(false);
    }
    let assignments = pairs
        .iter()
        .map(|(c, _)| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE users SET {assignments} WHERE user_id = ?");
    let mut query = sqlx::query(&sql);
    for (_, param) in &pairs {
        query = db::bind_param(query, param);
    }
    let result = query.bind(user_id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a user, optionally cascading over the per-user data tables.
#[instrument(skip_all, fields(user_id = user_id, cascade = cascade))]
pub async fn delete_user(pool: &Pool, user_id: i64, cascade: bool) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    if cascade {
        for table in ["workout_analysis", "nutrition", "workouts", "derived_metrics"] {
            let sql = format!("DELETE FROM {table} WHERE user_id = ?");
            sqlx::query(&sql).bind(user_id).execute(&mut *tx).await?;
        }
    }
    let deleted = sqlx::query("DELETE FROM users WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

pub async fn count_users(pool: &Pool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WorkoutStats {
    pub total_calories: Option<f64>,
    pub avg_calories: Option<f64>,
    pub avg_duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NutritionStats {
    pub avg_calories: Option<f64>,
    pub avg_proteins: Option<f64>,
    pub avg_carbs: Option<f64>,
    pub avg_fats: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AnalysisStats {
    pub avg_cal_balance: Option<f64>,
    pub avg_training_efficiency: Option<f64>,
    pub avg_recovery_index: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatistics {
    pub profile: UserProfile,
    pub workouts: WorkoutStats,
    pub nutrition: NutritionStats,
    pub analysis: AnalysisStats,
}

/// Aggregate view over one user's workouts, nutrition, and analysis rows.
pub async fn user_statistics(
    pool: &Pool,
    user_id: i64,
) -> Result<Option<UserStatistics>, sqlx::Error> {
    let Some(profile) = get_user(pool, user_id).await? else {
        return Ok(None);
    };

    let workouts = sqlx::query_as::<_, WorkoutStats>(
        "SELECT ROUND(SUM(calories_burned), 2) AS total_calories, \
                ROUND(AVG(calories_burned), 2) AS avg_calories, \
                ROUND(AVG(session_duration), 2) AS avg_duration \
         FROM workouts WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let nutrition = sqlx::query_as::<_, NutritionStats>(
        "SELECT ROUND(AVG(calories), 2) AS avg_calories, \
                ROUND(AVG(proteins), 2) AS avg_proteins, \
                ROUND(AVG(carbs), 2) AS avg_carbs, \
                ROUND(AVG(fats), 2) AS avg_fats \
         FROM nutrition WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let analysis = sqlx::query_as::<_, AnalysisStats>(
        "SELECT ROUND(AVG(cal_balance), 2) AS avg_cal_balance, \
                ROUND(AVG(training_efficiency), 2) AS avg_training_efficiency, \
                ROUND(AVG(recovery_index), 2) AS avg_recovery_index \
         FROM workout_analysis WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(Some(UserStatistics {
        profile,
        workouts,
        nutrition,
        analysis,
    }))
}

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
    async fn create_derives_bmi() {
        let pool = setup_pool().await;
        let id = create_user(
            &pool,
            UserFields {
                weight: Some(81.0),
                height: Some(1.8),
                gender: Some("Female".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let user = get_user(&pool, id).await.unwrap().unwrap();
        assert!((user.bmi.unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(user.gender.as_deref(), Some("Female"));
    }

    #[tokio::test]
    async fn create_empty_allocates_id() {
        let pool = setup_pool().await;
        let first = create_user(&pool, UserFields::default()).await.unwrap();
        let second = create_user(&pool, UserFields::default()).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn update_recomputes_bmi_from_merged_fields() {
        let pool = setup_pool().await;
        let id = create_user(
            &pool,
            UserFields {
                weight: Some(81.0),
                height: Some(1.8),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Only weight changes; height comes from the stored profile.
        let updated = update_user(
            &pool,
            id,
            UserFields {
                weight: Some(90.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(updated);

        let user = get_user(&pool, id).await.unwrap().unwrap();
        assert!((user.bmi.unwrap() - 90.0 / (1.8 * 1.8)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn update_missing_user_returns_false() {
        let pool = setup_pool().await;
        let updated = update_user(
            &pool,
            99,
            UserFields {
                age: Some(30.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn delete_cascades_related_rows() {
        let pool = setup_pool().await;
        let id = create_user(
            &pool,
            UserFields {
                age: Some(30.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        sqlx::query("INSERT INTO workouts (user_id, calories_burned) VALUES (?, 500)")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO nutrition (user_id, calories) VALUES (?, 2000)")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(delete_user(&pool, id, true).await.unwrap());
        assert!(get_user(&pool, id).await.unwrap().is_none());
        let leftovers: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM workouts) + (SELECT COUNT(*) FROM nutrition)",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn delete_missing_user_returns_false() {
        let pool = setup_pool().await;
        assert!(!delete_user(&pool, 42, false).await.unwrap());
    }

    #[tokio::test]
    async fn list_supports_search_and_paging() {
        let pool = setup_pool().await;
        for gender in ["Male", "Female", "Female", "Male"] {
            create_user(
                &pool,
                UserFields {
                    gender: Some(gender.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let females = list_users(
            &pool,
            &ListOptions {
                search: Some("Fem".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(females.len(), 2);

        let page = list_users(
            &pool,
            &ListOptions {
                limit: Some(2),
                offset: 2,
                order_desc: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].user_id, 3);

        let newest_first = list_users(
            &pool,
            &ListOptions {
                limit: Some(1),
                order_desc: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(newest_first[0].user_id, 4);

        assert_eq!(count_users(&pool).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn statistics_aggregate_per_user() {
        let pool = setup_pool().await;
        let id = create_user(
            &pool,
            UserFields {
                weight: Some(70.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        for calories in [400.0, 600.0] {
            sqlx::query(
                "INSERT INTO workouts (user_id, calories_burned, session_duration) VALUES (?, ?, 1.0)",
            )
            .bind(id)
            .bind(calories)
            .execute(&pool)
            .await
            .unwrap();
        }

        let stats = user_statistics(&pool, id).await.unwrap().unwrap();
        assert_eq!(stats.workouts.total_calories, Some(1000.0));
        assert_eq!(stats.workouts.avg_calories, Some(500.0));
        // No nutrition rows: aggregates stay absent rather than zero.
        assert_eq!(stats.nutrition.avg_calories, None);

        assert!(user_statistics(&pool, 999).await.unwrap().is_none());
    }
}
