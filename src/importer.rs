//! CSV dataset import: normalizes the external column vocabulary onto the
//! internal schema and bulk-loads the per-row tables.

use crate::db::{self, Pool, SqlParam};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// External dataset header -> internal field name.
const COLUMN_MAP: &[(&str, &str)] = &[
    ("Age", "age"),
    ("Gender", "gender"),
    ("Height (m)", "height"),
    ("Weight (kg)", "weight"),
    ("BMI", "bmi"),
    ("Workout_Type", "workout_type"),
    ("Session_Duration (hours)", "session_duration"),
    ("Calories_Burned", "calories_burned"),
    ("Max_BPM", "max_bpm"),
    ("Avg_BPM", "avg_bpm"),
    ("Resting_BPM", "resting_bpm"),
    ("Carbs", "carbs"),
    ("Proteins", "proteins"),
    ("Fats", "fats"),
    ("sugar_g", "sugar_g"),
    ("sodium_mg", "sodium_mg"),
    ("Calories", "calories_intake"),
    ("Fat_Percentage", "fat_percentage"),
    ("Water_Intake (liters)", "water_intake"),
    ("lean_mass_kg", "lean_mass_kg"),
    ("cal_balance", "cal_balance"),
];

/// Imports the fitness dataset CSV into the SQLite schema.
pub struct DataImporter {
    pool: Pool,
}

impl DataImporter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Read the CSV, normalize columns, and insert into the per-row tables.
    /// Returns the number of imported source rows.
    ///
    /// Unparsable or absent numeric cells become NULL without dropping the
    /// row; absent text cells become the empty string. The whole load
    /// (optional truncate plus all inserts) runs in one transaction.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn import_csv(&self, path: &Path, clear_existing: bool) -> Result<usize, ImportError> {
        if !path.exists() {
            return Err(ImportError::SourceNotFound(path.to_path_buf()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        // Internal field name -> source column index, for the columns present.
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (external, internal) in COLUMN_MAP {
            if let Some(pos) = headers.iter().position(|h| h == *external) {
                index.insert(*internal, pos);
            }
        }

        let numeric = |record: &csv::StringRecord, field: &str| -> SqlParam {
            index
                .get(field)
                .and_then(|&i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<f64>().ok())
                .into()
        };
        let text = |record: &csv::StringRecord, field: &str| -> SqlParam {
            index
                .get(field)
                .and_then(|&i| record.get(i))
                .map(str::trim)
                .unwrap_or("")
                .into()
        };

        let mut user_rows: Vec<Vec<SqlParam>> = Vec::new();
        let mut workout_rows: Vec<Vec<SqlParam>> = Vec::new();
        let mut nutrition_rows: Vec<Vec<SqlParam>> = Vec::new();
        let mut metrics_rows: Vec<Vec<SqlParam>> = Vec::new();

        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            // Deterministic pseudo user id per source row.
            let user_id = SqlParam::Integer(row_idx as i64 + 1);

            user_rows.push(vec![
                user_id.clone(),
                text(&record, "gender"),
                numeric(&record, "age"),
                numeric(&record, "height"),
                numeric(&record, "weight"),
                numeric(&record, "bmi"),
                numeric(&record, "fat_percentage"),
                numeric(&record, "water_intake"),
                numeric(&record, "lean_mass_kg"),
            ]);
            workout_rows.push(vec![
                user_id.clone(),
                text(&record, "workout_type"),
                numeric(&record, "session_duration"),
                numeric(&record, "calories_burned"),
                numeric(&record, "max_bpm"),
                numeric(&record, "avg_bpm"),
                numeric(&record, "resting_bpm"),
            ]);
            nutrition_rows.push(vec![
                user_id.clone(),
                numeric(&record, "carbs"),
                numeric(&record, "proteins"),
                numeric(&record, "fats"),
                numeric(&record, "sugar_g"),
                numeric(&record, "sodium_mg"),
                numeric(&record, "calories_intake"),
            ]);
            metrics_rows.push(vec![
                user_id,
                numeric(&record, "fat_percentage"),
                numeric(&record, "water_intake"),
                numeric(&record, "lean_mass_kg"),
                numeric(&record, "cal_balance"),
            ]);
        }

        let mut tx = self.pool.begin().await?;
        if clear_existing {
            db::truncate_tables_tx(
                &mut tx,
                &["workouts", "nutrition", "derived_metrics", "users"],
            )
            .await?;
        }
        db::insert_many_tx(
            &mut tx,
            "users",
            &[
                "user_id",
                "gender",
                "age",
                "height",
                "weight",
                "bmi",
                "fat_percentage",
                "water_intake",
                "lean_mass_kg",
            ],
            &user_rows,
        )
        .await?;
        db::insert_many_tx(
            &mut tx,
            "workouts",
            &[
                "user_id",
                "workout_type",
                "session_duration",
                "calories_burned",
                "max_bpm",
                "avg_bpm",
                "resting_bpm",
            ],
            &workout_rows,
        )
        .await?;
        db::insert_many_tx(
            &mut tx,
            "nutrition",
            &[
                "user_id",
                "carbs",
                "proteins",
                "fats",
                "sugar_g",
                "sodium_mg",
                "calories",
            ],
            &nutrition_rows,
        )
        .await?;
        db::insert_many_tx(
            &mut tx,
            "derived_metrics",
            &[
                "user_id",
                "fat_percentage",
                "water_intake",
                "lean_mass_kg",
                "cal_balance",
            ],
            &metrics_rows,
        )
        .await?;
        tx.commit().await?;

        info!(rows = user_rows.len(), "dataset imported");
        Ok(user_rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Row, SqlitePool};
    use std::io::Write;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const SAMPLE: &str = "\
Age,Gender,Height (m),Weight (kg),BMI,Workout_Type,Session_Duration (hours),Calories_Burned,Max_BPM,Avg_BPM,Resting_BPM,Carbs,Proteins,Fats,Calories,Fat_Percentage,Water_Intake (liters),lean_mass_kg,cal_balance
25,Male,1.8,82,25.3,Yoga,1.5,700,180,140,60,250,120,70,2500,18.5,2.6,66.9,-300
oops,Female,1.65,,22.1,HIIT,1.0,600,175,150,65,200,100,60,2200,22.0,2.1,52.3,150
";

    #[tokio::test]
    async fn imports_rows_and_splits_tables() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "data.csv", SAMPLE);

        let importer = DataImporter::new(pool.clone());
        let count = importer.import_csv(&path, true).await.unwrap();
        assert_eq!(count, 2);

        let row = sqlx::query("SELECT gender, weight FROM users WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("gender"), "Male");
        assert_eq!(row.get::<f64, _>("weight"), 82.0);

        let workouts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workouts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(workouts, 2);
        let metrics: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM derived_metrics")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(metrics, 2);
    }

    #[tokio::test]
    async fn bad_numeric_cell_becomes_null_row_survives() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "data.csv", SAMPLE);

        DataImporter::new(pool.clone())
            .import_csv(&path, true)
            .await
            .unwrap();

        // Row 2 had `oops` for Age and an empty Weight cell.
        let row = sqlx::query("SELECT age, weight, gender FROM users WHERE user_id = 2")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<Option<f64>, _>("age"), None);
        assert_eq!(row.get::<Option<f64>, _>("weight"), None);
        assert_eq!(row.get::<String, _>("gender"), "Female");
    }

    #[tokio::test]
    async fn absent_columns_default_to_null_and_empty() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "tiny.csv", "Age,Weight (kg)\n30,70\n");

        DataImporter::new(pool.clone())
            .import_csv(&path, true)
            .await
            .unwrap();

        let row = sqlx::query("SELECT gender, bmi, weight FROM users WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("gender"), "");
        assert_eq!(row.get::<Option<f64>, _>("bmi"), None);
        assert_eq!(row.get::<f64, _>("weight"), 70.0);
    }

    #[tokio::test]
    async fn reimport_replaces_existing_rows() {
        let pool = setup_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "data.csv", SAMPLE);

        let importer = DataImporter::new(pool.clone());
        importer.import_csv(&path, true).await.unwrap();
        importer.import_csv(&path, true).await.unwrap();

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(users, 2);
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let pool = setup_pool().await;
        let err = DataImporter::new(pool)
            .import_csv(Path::new("/no/such/file.csv"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::SourceNotFound(_)));
        assert!(err.to_string().contains("/no/such/file.csv"));
    }
}
