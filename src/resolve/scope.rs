//! Name scope threaded through the pipeline walk.
//!
//! The frame is the column set produced by the pipeline so far. Base tables
//! contribute a wildcard (their columns are not known up front and
//! materialize on first reference); `select`, `derive` and `aggregate`
//! reshape the frame as the walk proceeds.

use crate::rq::ColumnId;

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub tables: Vec<TableScope>,
    pub columns: Vec<FrameColumn>,
}

#[derive(Debug, Clone)]
pub struct TableScope {
    /// Name this table is addressed by in the query (alias wins).
    pub reference: String,
    /// Index into the RQ pipeline of the `Source`/`Join` that introduced it.
    pub source_index: usize,
    /// Whether unknown names may still materialize from this table.
    /// Cleared by projections, which fix the column set.
    pub wildcard: bool,
}

#[derive(Debug, Clone)]
pub enum FrameColumn {
    Named { name: String, id: ColumnId },
    /// All columns of `tables[table_index]`.
    Wildcard { table_index: usize },
}

impl Frame {
    /// Find a named column. Reverse order, so a name defined later in the
    /// pipeline shadows an identically named upstream column.
    pub fn find_named(&self, name: &str) -> Option<ColumnId> {
        self.columns.iter().rev().find_map(|c| match c {
            FrameColumn::Named { name: n, id } if n == name => Some(*id),
            _ => None,
        })
    }

    /// Indices of tables whose wildcard is still visible in the frame.
    pub fn wildcard_tables(&self) -> Vec<usize> {
        self.columns
            .iter()
            .filter_map(|c| match c {
                FrameColumn::Wildcard { table_index } => Some(*table_index),
                _ => None,
            })
            .collect()
    }

    pub fn table_by_reference(&self, reference: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.reference == reference)
    }

    /// Fix the column set: no table may contribute new names after this.
    pub fn close_wildcards(&mut self) {
        for table in &mut self.tables {
            table.wildcard = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_name_shadows_earlier() {
        let mut frame = Frame::default();
        frame.columns.push(FrameColumn::Named {
            name: "x".into(),
            id: 1,
        });
        frame.columns.push(FrameColumn::Named {
            name: "x".into(),
            id: 2,
        });
        assert_eq!(frame.find_named("x"), Some(2));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let mut frame = Frame::default();
        frame.columns.push(FrameColumn::Named {
            name: "Total".into(),
            id: 1,
        });
        assert_eq!(frame.find_named("total"), None);
        assert_eq!(frame.find_named("Total"), Some(1));
    }
}
