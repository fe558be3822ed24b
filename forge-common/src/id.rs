/// Declares a `Uuid`-backed newtype ID with the `Display`/`FromStr`/serde/sqlx
/// glue every entity ID in this crate needs.
///
/// The teacher (`golem_common::newtype_uuid!`) has an equivalent macro but its
/// implementation isn't in the retrieved source, so this is a local
/// reimplementation of the same shape rather than a fabricated dependency.
#[macro_export]
macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(value: uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    id_newtype!(TestId);

    #[test]
    fn round_trips_through_string() {
        let id = TestId::new_v4();
        let parsed: TestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
