use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error::LookupError;
use crate::lookup::{GradeSource, SearchTerms};
use crate::models::{StudentRecord, StudentStatus};

/// The grade table reached directly over Postgres.
pub struct PgGradeSource {
    pool: PgPool,
    table: String,
}

impl PgGradeSource {
    /// `table` must already be validated as a plain identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }
}

#[async_trait]
impl GradeSource for PgGradeSource {
    async fn find(&self, terms: &SearchTerms) -> Result<Vec<StudentRecord>, LookupError> {
        let query = format!(
            r#"
            SELECT "Nombre"::text AS name,
                   "Número de ID"::text AS student_id,
                   "Dirección de correo"::text AS email,
                   "% Actividades realizadas"::float8 AS completion_rate,
                   "Nota"::text AS grade,
                   "Condición del estudiante"::text AS status
            FROM {}
            WHERE "Número de ID"::text = $1
               OR lower("Dirección de correo") = $2
            "#,
            self.table
        );
        debug!(table = %self.table, "querying grade table");

        let rows = sqlx::query(&query)
            .bind(&terms.id)
            .bind(&terms.email)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let name: Option<String> = row.try_get("name")?;
            let email: Option<String> = row.try_get("email")?;
            let grade: Option<String> = row.try_get("grade")?;
            let status: Option<String> = row.try_get("status")?;
            records.push(StudentRecord {
                name: name.unwrap_or_default(),
                id: row.try_get("student_id")?,
                email: email.unwrap_or_default(),
                completion_rate: row.try_get("completion_rate")?,
                grade: grade.unwrap_or_default(),
                status: StudentStatus::from(status.unwrap_or_default()),
            });
        }

        Ok(records)
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Writes one record, replacing any existing row with the same ID.
async fn upsert(pool: &PgPool, table: &str, record: &StudentRecord) -> anyhow::Result<u64> {
    let query = format!(
        r#"
        INSERT INTO {table}
        ("Nombre", "Número de ID", "Dirección de correo",
         "% Actividades realizadas", "Nota", "Condición del estudiante")
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT ("Número de ID") DO UPDATE
        SET "Nombre" = EXCLUDED."Nombre",
            "Dirección de correo" = EXCLUDED."Dirección de correo",
            "% Actividades realizadas" = EXCLUDED."% Actividades realizadas",
            "Nota" = EXCLUDED."Nota",
            "Condición del estudiante" = EXCLUDED."Condición del estudiante"
        "#
    );

    let result = sqlx::query(&query)
        .bind(&record.name)
        .bind(&record.id)
        .bind(&record.email)
        .bind(record.completion_rate)
        .bind(&record.grade)
        .bind(record.status.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn seed(pool: &PgPool, table: &str) -> anyhow::Result<()> {
    let students = vec![
        ("Ana Pérez", "1001", "ana.perez@frba.utn.edu.ar", 0.95, "9", "Promociona"),
        ("Luis Gómez", "1002", "luis.gomez@frba.utn.edu.ar", 0.72, "5", "Final"),
        ("Marta Ruiz", "1003", "Marta.Ruiz@frba.utn.edu.ar", 0.31, "2", "Libre"),
        ("Tomás Díaz", "1004", "tomas.diaz@frba.utn.edu.ar", 1.0, "10", "Promociona"),
    ];

    for (name, id, email, completion_rate, grade, status) in students {
        let record = StudentRecord {
            name: name.to_string(),
            id: id.to_string(),
            email: email.to_string(),
            completion_rate: Some(completion_rate),
            grade: grade.to_string(),
            status: StudentStatus::from(status.to_string()),
        };
        upsert(pool, table, &record).await?;
    }

    Ok(())
}

pub async fn import_csv(
    pool: &PgPool,
    table: &str,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        id: String,
        email: String,
        completion_rate: Option<f64>,
        grade: String,
        status: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut written = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        if let Some(rate) = row.completion_rate.filter(|rate| !(0.0..=1.0).contains(rate)) {
            anyhow::bail!(
                "completion_rate for {} must be a fraction in [0, 1], got {}",
                row.id,
                rate
            );
        }

        let record = StudentRecord {
            name: row.name.trim().to_string(),
            id: row.id.trim().to_string(),
            email: row.email.trim().to_string(),
            completion_rate: row.completion_rate,
            grade: row.grade.trim().to_string(),
            status: StudentStatus::from(row.status.trim().to_string()),
        };

        if upsert(pool, table, &record).await? > 0 {
            written += 1;
        }
    }

    Ok(written)
}
