use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{Actor, ExportKind, ExportTable, ParseEnumError};
use crate::store::ExportRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    /// Tab separated, opened by Excel.
    Excel,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xls",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Excel => "application/vnd.ms-excel; charset=utf-8",
        }
    }

    fn delimiter(&self) -> char {
        match self {
            ExportFormat::Csv => ',',
            ExportFormat::Excel => '\t',
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xls" => Ok(ExportFormat::Excel),
            other => Err(ParseEnumError::new("export format", other)),
        }
    }
}

/// Готовый к отдаче файл.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub body: String,
}

/// "1, 2,3" -> [1, 2, 3]. Пустая строка означает "все строки".
pub fn parse_ids(raw: Option<&str>) -> AppResult<Option<Vec<i64>>> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| AppError::validation(format!("Invalid id in ids: '{}'", part)))
        })
        .collect::<AppResult<Vec<_>>>()
        .map(Some)
}

fn escape_field(value: &str, format: ExportFormat) -> String {
    match format {
        ExportFormat::Csv => {
            if value.contains([',', '"', '\n', '\r']) {
                format!("\"{}\"", value.replace('"', "\"\""))
            } else {
                value.to_string()
            }
        }
        // В TSV кавычки не нужны, табы и переводы строк просто гасим
        ExportFormat::Excel => value.replace(['\t', '\n', '\r'], " "),
    }
}

pub fn render(table: &ExportTable, format: ExportFormat) -> String {
    let delimiter = format.delimiter().to_string();
    let mut out = String::new();
    for line in std::iter::once(&table.headers).chain(table.rows.iter()) {
        let fields: Vec<String> = line.iter().map(|v| escape_field(v, format)).collect();
        out.push_str(&fields.join(&delimiter));
        out.push_str("\r\n");
    }
    out
}

pub fn file_name(kind: ExportKind, format: ExportFormat, at: DateTime<Utc>) -> String {
    format!("{}_export_{}.{}", kind, at.format("%Y%m%d_%H%M%S"), format.extension())
}

#[derive(Clone)]
pub struct ExportService {
    repo: Arc<dyn ExportRepository>,
}

impl ExportService {
    pub fn new(repo: Arc<dyn ExportRepository>) -> Self {
        Self { repo }
    }

    pub async fn export(
        &self,
        actor: &Actor,
        kind: ExportKind,
        format: ExportFormat,
        ids: Option<Vec<i64>>,
    ) -> AppResult<ExportFile> {
        if !actor.is_admin() {
            return Err(AppError::forbidden("Only admins can export data"));
        }
        let table = self.repo.export_table(kind, ids.as_deref()).await?;
        info!("📤 Admin {} exported {} {} row(s) as {:?}", actor.account_id, table.rows.len(), kind, format);
        Ok(ExportFile {
            file_name: file_name(kind, format, Utc::now()),
            content_type: format.content_type(),
            body: render(&table, format),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Client;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn table() -> ExportTable {
        let mut t = ExportTable::new(ExportKind::Clients);
        t.rows.push(vec!["1".into(), "Acme, Inc".into(), "a@acme.io".into(), "say \"hi\"".into(), String::new()]);
        t
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let body = render(&table(), ExportFormat::Csv);
        let mut lines = body.split("\r\n");
        assert_eq!(lines.next(), Some("id,name,email,phone,created_at"));
        assert_eq!(lines.next(), Some("1,\"Acme, Inc\",a@acme.io,\"say \"\"hi\"\"\","));
    }

    #[test]
    fn excel_is_tab_separated() {
        let body = render(&table(), ExportFormat::Excel);
        assert!(body.starts_with("id\tname\temail\tphone\tcreated_at\r\n"));
        assert!(body.contains("1\tAcme, Inc\ta@acme.io\tsay \"hi\"\t"));
    }

    #[test]
    fn ids_are_parsed_and_validated() {
        assert_eq!(parse_ids(None).unwrap(), None);
        assert_eq!(parse_ids(Some("  ")).unwrap(), None);
        assert_eq!(parse_ids(Some("3, 1,,2")).unwrap(), Some(vec![3, 1, 2]));
        assert!(parse_ids(Some("1,x")).is_err());
        assert!(parse_ids(Some("-4")).is_err());
    }

    #[test]
    fn file_name_has_timestamp_and_extension() {
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 9, 5, 7).unwrap();
        assert_eq!(file_name(ExportKind::Events, ExportFormat::Excel, at), "events_export_20261015_090507.xls");
        assert_eq!(file_name(ExportKind::Users, ExportFormat::Csv, at), "users_export_20261015_090507.csv");
    }

    #[test]
    fn format_parses_aliases() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("excel".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn only_admins_export_and_ids_filter_rows() {
        let store = Arc::new(MemoryStore::new());
        for id in 1..=3 {
            store.seed_client(Client {
                id,
                name: format!("Client {}", id),
                email: format!("c{}@eventra.test", id),
                phone: None,
            });
        }
        let service = ExportService::new(store);

        let denied = service.export(&Actor::client(1), ExportKind::Clients, ExportFormat::Csv, None).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        let file = service
            .export(&Actor::admin(1), ExportKind::Clients, ExportFormat::Csv, Some(vec![2, 3]))
            .await
            .unwrap();
        assert_eq!(file.body.lines().count(), 3);
        assert!(file.body.contains("Client 2"));
        assert!(!file.body.contains("Client 1,"));
        assert!(file.file_name.starts_with("clients_export_"));
    }
}
