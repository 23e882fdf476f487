use tabled::{Table, Tabled, settings::Style};

use crate::storage::DbStats;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Rows")]
    pub rows: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, table: &str, rows: usize) {
        self.rows.push(TableRow {
            table: table.to_string(),
            rows: rows.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Row counts per table, rendered for the terminal
pub fn stats_table(stats: &DbStats) -> String {
    let mut builder = TableBuilder::new();
    for (table, rows) in stats.rows() {
        builder.add_row(table, rows);
    }
    builder.build()
}
