/// Trait for error types that can be constructed from a plain message string.
///
/// Implement this for a crate's error type, then invoke [`impl_context!`] in
/// its error module to get `.context()` and `.with_context()` on `Result`.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait over `Result`.
///
/// Invoke inside a module that defines `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`:
///
/// ```ignore
/// // in crates/foo/src/error.rs
/// wabridge_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            /// Wrap the error with a fixed message prefix.
            fn context(self, context: impl Into<String>) -> Result<T>;
            /// Wrap the error with a lazily built message prefix.
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let context = context.into();
                self.with_context(move || context)
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    <Error as $crate::FromMessage>::from_message(format!(
                        "{}: {source}",
                        f().into()
                    ))
                })
            }
        }
    };
}
