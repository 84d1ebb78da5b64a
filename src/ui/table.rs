use tabled::{settings::Style, Table, Tabled};

use crate::model::{Url, User, Visit};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        render(&self.rows)
    }
}

#[derive(Tabled)]
struct UrlRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Last visit")]
    last_visit: String,
    #[tabled(rename = "Visits")]
    visits: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "URL")]
    address: String,
}

#[derive(Tabled)]
struct UserRow {
    #[tabled(rename = "Id")]
    id: i64,
    #[tabled(rename = "User")]
    name: String,
    #[tabled(rename = "SHA-256")]
    digest: String,
}

#[derive(Tabled)]
struct VisitRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Url")]
    url: i64,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "Transition")]
    transition: String,
}

const MAX_CELL: usize = 60;

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CELL {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_CELL - 1).collect();
    format!("{}…", head)
}

fn render<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn url_table(urls: &[Url]) -> String {
    let rows: Vec<UrlRow> = urls
        .iter()
        .map(|u| UrlRow {
            key: u.key().to_string(),
            last_visit: u.last_visit_time.to_string(),
            visits: u.visit_count,
            title: truncate(&u.title),
            address: truncate(&u.address),
        })
        .collect();
    render(&rows)
}

pub fn user_table(users: &[User]) -> String {
    let rows: Vec<UserRow> = users
        .iter()
        .map(|u| UserRow {
            id: u.id,
            name: u.name.clone(),
            digest: u.content_digest.chars().take(12).collect(),
        })
        .collect();
    render(&rows)
}

pub fn visit_table(visits: &[Visit]) -> String {
    let rows: Vec<VisitRow> = visits
        .iter()
        .map(|v| VisitRow {
            key: v.key().to_string(),
            time: v.visit_time.to_string(),
            url: v.url_local_id,
            from: v
                .from_visit_key()
                .map(|k| k.local_id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            transition: v.transition.to_string(),
        })
        .collect();
    render(&rows)
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{url, visit};

    #[test]
    fn test_empty_tables_render_nothing() {
        assert_eq!(url_table(&[]), "");
        assert_eq!(TableBuilder::new().build(), "");
    }

    #[test]
    fn test_url_table() {
        let long = format!("https://a.test/{}", "x".repeat(100));
        let table = url_table(&[url(1, 7, &long, "Title", 13109575048813599)]);
        assert!(table.contains("1/7"));
        assert!(table.contains("2016-06-05T04:37:28.813599Z"));
        assert!(table.contains('…'));
        assert!(!table.contains(&long));
    }

    #[test]
    fn test_visit_table_marks_chain_start() {
        let table = visit_table(&[visit(1, 10, 1, 0), visit(1, 11, 1, 10)]);
        assert!(table.contains("1/10"));
        assert!(table.contains(" - "));
    }

    #[test]
    fn test_stats_table() {
        let table = stats_table(&[("Users", "2"), ("URLs", "10")]);
        assert!(table.contains("Metric"));
        assert!(table.contains("URLs"));
    }
}
