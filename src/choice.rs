//! Enums that are stored as text and sent as lowercase strings.

/// Define an enum whose variants map to fixed strings.
///
/// The enum gets `as_str`, `FromStr` (failing with [Error::InvalidChoice](crate::Error)),
/// `Display`, serde support and rusqlite `ToSql`/`FromSql` using those strings.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($field:literal) {
            $($(#[$variant_meta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::Error::InvalidChoice {
                        field: $field,
                        value: s.to_owned(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value.as_str()?.parse().map_err(|error: $crate::Error| {
                    rusqlite::types::FromSqlError::Other(Box::new(error))
                })
            }
        }
    };
}

pub(crate) use text_enum;

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use crate::Error;

    text_enum! {
        enum Colour ("colour") {
            Red => "red",
            DarkBlue => "dark_blue",
        }
    }

    #[test]
    fn parses_ignoring_case() {
        assert_eq!("RED".parse::<Colour>(), Ok(Colour::Red));
        assert_eq!(" dark_blue ".parse::<Colour>(), Ok(Colour::DarkBlue));
    }

    #[test]
    fn unknown_value_is_invalid_choice() {
        assert_eq!(
            "green".parse::<Colour>(),
            Err(Error::InvalidChoice {
                field: "colour",
                value: "green".to_owned()
            })
        );
    }

    #[test]
    fn serializes_as_text() {
        assert_eq!(serde_json::to_string(&Colour::DarkBlue).unwrap(), "\"dark_blue\"");
        assert_eq!(
            serde_json::from_str::<Colour>("\"red\"").unwrap(),
            Colour::Red
        );
    }

    #[test]
    fn round_trips_through_sqlite() {
        let connection = Connection::open_in_memory().unwrap();

        let colour: Colour = connection
            .query_row("SELECT ?1", [Colour::DarkBlue], |row| row.get(0))
            .unwrap();

        assert_eq!(colour, Colour::DarkBlue);
    }
}
