use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PostureState {
    #[default]
    Unknown,
    Good,
    Bad,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posture_defaults_to_unknown() {
        assert_eq!(PostureState::default(), PostureState::Unknown);
        assert_eq!(serde_json::to_string(&PostureState::Bad).unwrap(), "\"bad\"");
    }
}
