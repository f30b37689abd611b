//! Helpers for building tables using the tabled crate.
use crate::utils::{Styling, uwriteln};
use std::io::Write;
use tabled::{
    builder::Builder,
    settings::{Alignment, Padding, Style, object::Columns},
};

struct TableCol {
    header: String,
    align: Alignment,
    help: String,
    fields: Vec<String>,
}

/// General table. They look like this:
/// start         end    size  flags  contents               if titles
/// -----         ---    ----  -----  --------
/// 400000     401000    4096  r-x    /opt/bin/app
/// 401000     402000    4096  r-x    segment was only partially dumped
///
/// start: the address of the first byte in the range          if explain
/// end: the address just after the last byte in the range
/// ...
pub struct TableBuilder {
    cols: Vec<TableCol>,
}

impl TableBuilder {
    pub fn new() -> TableBuilder {
        TableBuilder { cols: Vec::new() }
    }

    /// Left aligned column
    pub fn add_col_l(&mut self, header: &str, help: &str) {
        self.add_col(header, help, Alignment::left());
    }

    /// Right aligned column
    pub fn add_col_r(&mut self, header: &str, help: &str) {
        self.add_col(header, help, Alignment::right());
    }

    fn add_col(&mut self, header: &str, help: &str, align: Alignment) {
        debug_assert!(!self.cols.iter().any(|c| c.header == header));
        self.cols.push(TableCol {
            header: header.to_string(),
            align,
            help: help.to_string(),
            fields: Vec::new(),
        });
    }

    /// Typically add_field! is used instead.
    pub fn add_str_field(&mut self, header: &str, value: String) {
        // We need to preserve add_col ordering so we can't use a HashMap
        // but O(n) should be fine for tables.
        let Some(col) = self.cols.iter_mut().find(|c| c.header == header) else {
            debug_assert!(false, "no {header} column");
            return;
        };
        if value.is_empty() {
            // For some reason empty fields screw up tabled formatting.
            col.fields.push(" ".table_field().to_string());
        } else {
            col.fields.push(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cols.first().is_none_or(|c| c.fields.is_empty())
    }

    pub fn writeln(&self, mut out: impl Write, titles: bool, explain: bool) {
        uwriteln!(out, "{}", self.table_str(titles));

        if explain {
            uwriteln!(out);
            uwriteln!(out, "{}", self.explain_str());
        }
    }

    fn table_str(&self, titles: bool) -> String {
        let height = self.cols.iter().map(|c| c.fields.len()).min().unwrap_or(0);
        let mut builder = Builder::with_capacity(height + 2, self.cols.len());
        if titles {
            let header: Vec<String> = self
                .cols
                .iter()
                .map(|c| c.header.as_str().table_header().to_string())
                .collect();
            let dashes: Vec<String> = self
                .cols
                .iter()
                .map(|c| "-".repeat(c.header.len()).table_sep().to_string())
                .collect();
            builder.push_record(&header);
            builder.push_record(&dashes);
        }
        for i in 0..height {
            let row: Vec<String> = self.cols.iter().map(|c| c.fields[i].clone()).collect();
            builder.push_record(&row);
        }

        let mut table = builder.build();
        for (i, col) in self.cols.iter().enumerate() {
            table.modify(Columns::one(i), col.align);
        }
        table.modify(Columns::first(), Padding::new(0, 1, 0, 0));
        table.with(Style::empty());

        table.to_string()
    }

    fn explain_str(&self) -> String {
        let explains: Vec<String> = self
            .cols
            .iter()
            .map(|c| {
                format!(
                    "{}: {}",
                    c.header.as_str().explain_title(),
                    c.help.as_str().explain_text()
                )
            })
            .collect();
        explains.join("\n")
    }
}

macro_rules! add_field {
    ($builder:ident, $header:literal, $value:expr) => {
        let s = format!("{}", $value);
        let s = s.table_field().to_string();
        $builder.add_str_field($header, s);
    };
    ($builder:ident, $header:literal, $format:literal, $value:expr) => {
        let s = format!($format, $value);
        let s = s.table_field().to_string();
        $builder.add_str_field($header, s);
    };
}
pub(crate) use add_field;

struct SimpleRow {
    name: String,
    value: String,
    help: String,
}

/// Table with just name and value columns. They look like this:
/// pid            42                   these have no titles
/// command line   /opt/bin/app -x
///
/// pid: the process id of the process that cored          if explain
/// command line: the start of the command line
pub struct SimpleTableBuilder {
    rows: Vec<SimpleRow>,
}

impl SimpleTableBuilder {
    pub fn new() -> SimpleTableBuilder {
        SimpleTableBuilder { rows: Vec::new() }
    }

    /// Typically add_simple! is used instead.
    pub fn add_str_row(&mut self, name: &str, value: String, help: &str) {
        self.rows.push(SimpleRow {
            name: name.to_string(),
            value,
            help: help.to_string(),
        });
    }

    pub fn writeln(&self, mut out: impl Write, explain: bool) {
        uwriteln!(out, "{}", self.table_str());

        if explain {
            uwriteln!(out);
            uwriteln!(out, "{}", self.explain_str());
        }
    }

    fn table_str(&self) -> String {
        let mut builder = Builder::with_capacity(self.rows.len(), 2);
        for row in self.rows.iter() {
            builder.push_record([row.name.clone(), row.value.clone()]);
        }

        let mut table = builder.build();
        table.modify(Columns::one(0), Alignment::left());
        table.modify(Columns::one(1), Alignment::left());
        table.modify(Columns::first(), Padding::new(0, 1, 0, 0));
        table.with(Style::empty());

        table.to_string()
    }

    fn explain_str(&self) -> String {
        let explains: Vec<String> = self
            .rows
            .iter()
            .filter(|r| !r.help.is_empty())
            .map(|r| {
                format!(
                    "{}: {}",
                    r.name.as_str().explain_title(),
                    r.help.as_str().explain_text()
                )
            })
            .collect();
        explains.join("\n")
    }
}

macro_rules! add_simple {
    ($builder:ident, $name:literal, $value:expr, $help:expr) => {
        let s = format!("{}", $value);
        let s = s.table_field().to_string();
        $builder.add_str_row($name, s, $help);
    };
    ($builder:ident, $name:literal, $format:literal, $value:expr, $help:expr) => {
        let s = format!($format, $value);
        let s = s.table_field().to_string();
        $builder.add_str_row($name, s, $help);
    };
}
pub(crate) use add_simple;
