use model::core::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub qualifier: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column name, always quoted.
    Identifier(Ident),
    /// A value sent as a bound parameter.
    Value(Value),
    /// A string constant inlined as a quoted literal.
    StringLiteral(String),
    Null,
    /// `*`, every column of the table.
    Wildcard,
    Alias { expr: Box<Expr>, alias: String },
    /// The value an insert proposed for the named column, referenced from an
    /// update-on-conflict assignment.
    Incoming(String),
}

impl Expr {
    pub fn aliased(self, alias: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }
}
