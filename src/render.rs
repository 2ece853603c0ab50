use std::fmt::Write;

use comfy_table::{Attribute, Cell, Table};
use serde_json::{json, Value};

use crate::error::LookupError;
use crate::lookup::{format_completion_rate, notice_for};
use crate::models::{LookupOutcome, Notice, StudentRecord};

pub const PROMPT_MESSAGE: &str = "Ingresa tu número de ID o email para ver tu calificación.";
pub const NO_MATCH_MESSAGE: &str = "No se encontraron resultados para el ID o email ingresado.";
pub const CELEBRATION: &str = "🎈  🎈  🎈  🎈  🎈  🎈  🎈";

const HEADERS: [&str; 6] = [
    "Nombre",
    "Número de ID",
    "Dirección de correo",
    "% Actividades realizadas",
    "Nota",
    "Condición del estudiante",
];

pub fn render_outcome(outcome: &LookupOutcome) -> String {
    let mut output = String::new();

    match outcome {
        LookupOutcome::EmptyInput => {
            let _ = writeln!(output, "{PROMPT_MESSAGE}");
        }
        LookupOutcome::NoMatch => {
            let _ = writeln!(output, "{NO_MATCH_MESSAGE}");
        }
        LookupOutcome::Found(rows) => {
            let _ = writeln!(output, "Tu calificación:");
            let _ = writeln!(output);
            output.push_str(&render_table(rows));

            if let Some(notice) = notice_for(rows) {
                let _ = writeln!(output);
                output.push_str(&render_notice(&notice));
            }
        }
    }

    output
}

pub fn render_error(err: &LookupError) -> String {
    format!("Error al consultar la base de calificaciones: {err}. Intenta nuevamente más tarde.\n")
}

pub fn render_notice(notice: &Notice) -> String {
    match notice {
        Notice::Promoted { name } => format!(
            "{CELEBRATION}\n¡Felicitaciones, {name}! ¡Has promocionado la materia! 🎉\n"
        ),
        Notice::FinalExam { name } => format!(
            "¡Hola, {name}! Te esperamos en la instancia de examen final 💪. \
             Hacenos todas las consultas que necesites 🤗\n"
        ),
    }
}

pub fn render_table(rows: &[StudentRecord]) -> String {
    let mut table = Table::new();
    table.set_header(
        HEADERS
            .iter()
            .map(|header| Cell::new(header).add_attribute(Attribute::Bold)),
    );

    for record in rows {
        table.add_row(vec![
            Cell::new(&record.name),
            Cell::new(&record.id),
            Cell::new(&record.email),
            Cell::new(format_completion_rate(record.completion_rate)),
            Cell::new(&record.grade),
            Cell::new(record.status.as_str()),
        ]);
    }

    format!("{table}\n")
}

/// Machine-readable form of an outcome for `--json`. Every outcome has the
/// same keys: `outcome`, `records`, `notice` and `error`.
pub fn render_json(outcome: &LookupOutcome) -> serde_json::Result<String> {
    let value = match outcome {
        LookupOutcome::EmptyInput => json_envelope("empty_input", Vec::new(), None, None),
        LookupOutcome::NoMatch => json_envelope("no_match", Vec::new(), None, None),
        LookupOutcome::Found(rows) => {
            let records = rows
                .iter()
                .map(|record| {
                    json!({
                        "name": record.name,
                        "id": record.id,
                        "email": record.email,
                        "completion_rate": record.completion_rate,
                        "completion": format_completion_rate(record.completion_rate),
                        "grade": record.grade,
                        "status": record.status,
                    })
                })
                .collect();
            let notice = notice_for(rows).map(|notice| match notice {
                Notice::Promoted { .. } => "promoted",
                Notice::FinalExam { .. } => "final_exam",
            });
            json_envelope("found", records, notice, None)
        }
    };
    serde_json::to_string_pretty(&value)
}

pub fn render_json_error(err: &LookupError) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&json_envelope("error", Vec::new(), None, Some(err.to_string())))
}

fn json_envelope(
    outcome: &str,
    records: Vec<Value>,
    notice: Option<&str>,
    error: Option<String>,
) -> Value {
    json!({
        "outcome": outcome,
        "records": records,
        "notice": notice,
        "error": error,
    })
}
