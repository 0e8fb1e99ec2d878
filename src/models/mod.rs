//! Data models shared by the facade, the codecs and the collaborators.

pub mod connection;
pub mod result;
pub mod value;

pub use connection::Backend;
pub use result::{ColumnType, ExecResult, ResultSet, Row};
pub use value::SqlValue;
