//! Facade subtypes with a process-wide instance and a static call surface.
//!
//! ```ignore
//! pg_sql_caller::sql_facade! {
//!     /// Reporting queries.
//!     pub struct ReportingSql { model: "Reporting" }
//! }
//!
//! let names = ReportingSql::select_values(
//!     "select name from employees where department_id = ?",
//!     &[7.into()],
//! )?;
//! ```
//!
//! Each key in the braces calls the builder method of the same name on
//! [`SqlFacadeBuilder`](crate::facade::SqlFacadeBuilder) (`model`, `types`,
//! `directory`). Leaving out `model` is allowed; operations then fail with
//! a configuration error.

/// Declare a facade subtype.
///
/// The generated unit struct has an `instance()` function returning the
/// subtype's single [`SqlFacade`](crate::facade::SqlFacade), built on first
/// access, and one static function per facade operation that forwards to it.
#[macro_export]
macro_rules! sql_facade {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident { $($key:ident : $value:expr),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $name {
            /// The process-wide instance of this facade.
            pub fn instance() -> &'static $crate::facade::SqlFacade {
                static INSTANCE: ::std::sync::OnceLock<$crate::facade::SqlFacade> =
                    ::std::sync::OnceLock::new();
                INSTANCE.get_or_init(|| {
                    let builder = $crate::facade::SqlFacade::builder(stringify!($name));
                    $(let builder = builder.$key($value);)*
                    builder.build()
                })
            }

            /// Run `block` in a transaction on the instance's connection.
            pub fn transaction<T, E, F>(block: F) -> ::std::result::Result<T, E>
            where
                E: ::std::convert::From<$crate::CallerError>,
                F: ::std::ops::FnOnce() -> ::std::result::Result<T, E>,
            {
                Self::instance().transaction(block)
            }
        }

        $crate::__delegate_to_instance!($name);
    };
}

/// Static forwarding functions, one per operation. The list is the single
/// source of the static surface, so each operation is bound exactly once.
#[doc(hidden)]
#[macro_export]
macro_rules! __delegate_to_instance {
    ($name:ident) => {
        $crate::__delegate_to_instance!(@emit $name [
            fn execute(sql: &str, binds: &[$crate::SqlValue]) -> $crate::ExecResult;
            fn select_all(sql: &str, binds: &[$crate::SqlValue]) -> $crate::ResultSet;
            fn select_values(sql: &str, binds: &[$crate::SqlValue]) -> ::std::vec::Vec<$crate::SqlValue>;
            fn select_rows(sql: &str, binds: &[$crate::SqlValue]) -> ::std::vec::Vec<::std::vec::Vec<$crate::SqlValue>>;
            fn select_value(sql: &str, binds: &[$crate::SqlValue]) -> ::std::option::Option<$crate::SqlValue>;
            fn select_row(sql: &str, binds: &[$crate::SqlValue]) -> ::std::option::Option<::std::vec::Vec<$crate::SqlValue>>;
            fn select_all_serialized(sql: &str, binds: &[$crate::SqlValue]) -> ::std::vec::Vec<$crate::Row>;
            fn select_value_serialized(sql: &str, binds: &[$crate::SqlValue]) -> $crate::SqlValue;
            fn select_values_serialized(sql: &str, binds: &[$crate::SqlValue]) -> ::std::vec::Vec<::std::vec::Vec<$crate::SqlValue>>;
            fn transaction_open() -> bool;
            fn explain_analyze(sql: &str) -> ::std::string::String;
            fn typecast_array(values: &[$crate::SqlValue], type_name: &str) -> ::std::string::String;
            fn sanitize_sql_array(sql: &str, binds: &[$crate::SqlValue]) -> ::std::string::String;
            fn next_sequence_value(table_name: &str) -> i64;
            fn table_full_size(table_name: &str) -> i64;
            fn table_data_size(table_name: &str) -> i64;
            fn current_database_name() -> ::std::string::String;
        ]);
    };
    (@emit $name:ident [$(fn $op:ident($($arg:ident: $ty:ty),*) -> $ret:ty;)*]) => {
        impl $name {
            $(
                pub fn $op($($arg: $ty),*) -> $crate::CallerResult<$ret> {
                    Self::instance().$op($($arg),*)
                }
            )*
        }
    };
}
