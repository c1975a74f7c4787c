use crate::query::{ast::expr::Expr, renderer::Render};

impl Render for Expr {
    fn render(&self, r: &mut super::Renderer) {
        match self {
            Expr::Identifier(ident) => {
                if let Some(qualifier) = &ident.qualifier {
                    r.sql.push_str(&r.dialect.quote_identifier(qualifier));
                    r.sql.push('.');
                }
                r.sql.push_str(&r.dialect.quote_identifier(&ident.name));
            }
            Expr::Value(value) => r.add_param(value.clone()),
            Expr::StringLiteral(text) => r.sql.push_str(&r.dialect.quote_literal(text)),
            Expr::Null => r.sql.push_str("NULL"),
            Expr::Wildcard => r.sql.push('*'),
            Expr::Alias { expr, alias } => {
                expr.render(r);
                r.sql.push_str(" AS ");
                r.sql.push_str(&r.dialect.quote_identifier(alias));
            }
            Expr::Incoming(column) => r.sql.push_str(&r.dialect.incoming_value(column)),
        }
    }
}
