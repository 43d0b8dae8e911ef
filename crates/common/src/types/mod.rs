use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub status: &'static str,
}

/// Body of `GET /`.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct Welcome {
    #[serde(rename = "welcome to")]
    pub welcome_to: &'static str,
}

impl Default for Welcome {
    fn default() -> Self {
        Self { welcome_to: "the universe" }
    }
}

/// Body returned by successful mutations.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct Status {
    pub status: &'static str,
}

impl Status {
    pub fn success() -> Self {
        Self { status: "success" }
    }
}
