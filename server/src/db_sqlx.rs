pub mod postgres {
    pub use sqlx_postgres::PgPoolOptions;
}

pub use sqlx_core::query_builder::QueryBuilder;
pub use sqlx_postgres::{PgPool, Postgres};
