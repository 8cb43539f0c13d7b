use serde::{
    Deserialize,
    Serialize,
};

/// Direction of value movement across the pool boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Public funds enter the pool.
    Shield,
    /// Pool funds leave to a public recipient.
    Unshield,
    /// Value moves between shielded owners; only the relayer fee leaves.
    Transfer,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shield => "shield",
            Self::Unshield => "unshield",
            Self::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
