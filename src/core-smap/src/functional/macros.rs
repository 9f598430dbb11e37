/// Construct a new type wrapper around a to-be-validated `String`.
/// The newtype only exists for values that are valid according to the $is_valid function.
/// Serde (de)serializes it as the plain string and rejects invalid input on the way in.
#[macro_export]
macro_rules! newtype_valid {
    ($name:ident, $is_valid:expr, $error:path, $new_error:expr) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl std::fmt::Display for $name {
            /// Displays the inner string only.
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl $name {
            /// Create a new instance of $name if the value is valid. Returns an error on failure.
            pub fn new(maybe_valid_inner: impl Into<String>) -> Result<Self, $error> {
                let maybe_valid_inner: String = maybe_valid_inner.into();
                if Self::is_valid(&maybe_valid_inner) {
                    Ok($name(maybe_valid_inner))
                } else {
                    let e: $error = $new_error(&maybe_valid_inner);
                    Err(e)
                }
            }

            /// True if the value is a valid instance of $name. False otherwise.
            pub fn is_valid(maybe_valid_inner: &str) -> bool {
                $is_valid(maybe_valid_inner)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Destroys the $name wrapper, obtaining the inner value directly.
            pub fn extract(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = $error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $name::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}
