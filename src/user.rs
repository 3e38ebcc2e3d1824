#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "backend-sql", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub pwhash: String,
    pub is_admin: bool,
}

/// A validated signup, password already hashed.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub pwhash: String,
}
