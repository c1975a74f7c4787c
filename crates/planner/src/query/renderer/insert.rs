use crate::query::{ast::insert::Insert, renderer::Render};

impl Render for Insert {
    fn render(&self, r: &mut super::Renderer) {
        // 1. INSERT [IGNORE] INTO table (...)
        r.sql.push_str(r.dialect.insert_verb(self.on_conflict.as_ref()));
        r.sql.push(' ');
        r.render_table_ref(&self.table);
        r.sql.push_str(" (");
        let quoted_columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| r.dialect.quote_identifier(c))
            .collect();
        r.sql.push_str(&quoted_columns.join(", "));
        r.sql.push(')');

        // 2. VALUES (...), (...)
        r.sql.push_str(" VALUES ");
        for (i, row) in self.values.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            r.sql.push('(');
            for (j, val) in row.iter().enumerate() {
                if j > 0 {
                    r.sql.push_str(", ");
                }
                val.render(r);
            }
            r.sql.push(')');
        }

        // 3. conflict handling
        if let Some(on_conflict) = &self.on_conflict {
            let suffix = r.dialect.conflict_suffix(on_conflict);
            r.sql.push_str(&suffix);
        }
    }
}
