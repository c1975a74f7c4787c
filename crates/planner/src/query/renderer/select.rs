use crate::query::{ast::select::Select, renderer::Render};

impl Render for Select {
    fn render(&self, r: &mut super::Renderer) {
        r.sql.push_str("SELECT ");
        if let Some(top) = self.limit.and_then(|n| r.dialect.top_clause(n)) {
            r.sql.push_str(&top);
            r.sql.push(' ');
        }

        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            column.render(r);
        }

        r.sql.push_str(" FROM ");
        r.render_table_ref(&self.from);

        if let Some(limit) = self.limit.and_then(|n| r.dialect.limit_clause(n)) {
            r.sql.push(' ');
            r.sql.push_str(&limit);
        }
    }
}
