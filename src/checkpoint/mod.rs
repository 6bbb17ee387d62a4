//! Restart points for interpreters.
//!
//! A [`Checkpoint`] is the serializable part of a snapshot: the active state
//! ids, the context and the recorded history. Actions, guards and actors are
//! not serializable; restoring re-attaches the checkpoint to the machine
//! definition and restarts the actors of the active states without running
//! entry actions.
//!
//! Where checkpoints are stored is up to the caller.

use crate::core::{Configuration, HistoryRecords, Machine, StateId};
use crate::interpreter::Status;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable restart point of an interpreter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<C> {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: Uuid,

    /// Id of the machine definition the checkpoint belongs to
    pub machine_id: String,

    /// When checkpoint was created
    pub created_at: DateTime<Utc>,

    /// Active state ids in document order
    pub configuration: Vec<String>,

    pub context: C,

    /// History state id -> recorded state ids
    pub history: BTreeMap<String, Vec<String>>,

    pub status: Status,

    pub output: Option<Value>,
}

impl<C> Checkpoint<C> {
    pub(crate) fn capture(
        machine: &Machine<C>,
        configuration: &Configuration,
        history: &HistoryRecords,
        context: C,
        status: Status,
        output: Option<Value>,
    ) -> Self {
        let ids = |states: &mut dyn Iterator<Item = StateId>| -> Vec<String> {
            states.map(|state| machine.node(state).id().to_string()).collect()
        };
        Self {
            version: CHECKPOINT_VERSION,
            id: Uuid::new_v4(),
            machine_id: machine.id().to_string(),
            created_at: Utc::now(),
            configuration: ids(&mut configuration.iter()),
            context,
            history: history
                .iter()
                .map(|(node, states)| {
                    (
                        machine.node(node).id().to_string(),
                        ids(&mut states.iter().copied()),
                    )
                })
                .collect(),
            status,
            output,
        }
    }

    pub fn to_json(&self) -> Result<String, CheckpointError>
    where
        C: Serialize,
    {
        serde_json::to_string(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError>
    where
        C: DeserializeOwned,
    {
        serde_json::from_str(json).map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))
    }

    /// Map the checkpoint's ids back onto `machine` and check that they form
    /// a valid configuration.
    pub fn resolve(
        &self,
        machine: &Machine<C>,
    ) -> Result<(Configuration, HistoryRecords), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        if self.machine_id != machine.id() {
            return Err(CheckpointError::MachineMismatch {
                expected: machine.id().to_string(),
                found: self.machine_id.clone(),
            });
        }

        let configuration = lookup_all(machine, &self.configuration)?
            .into_iter()
            .collect::<Configuration>();
        machine
            .validate_configuration(&configuration)
            .map_err(CheckpointError::InvalidConfiguration)?;

        let mut history = HistoryRecords::new();
        for (node, states) in &self.history {
            let node_id = lookup(machine, node)?;
            if !machine.node(node_id).is_history() {
                return Err(CheckpointError::NotHistory(node.clone()));
            }
            history = history.record(node_id, lookup_all(machine, states)?);
        }
        Ok((configuration, history))
    }
}

fn lookup<C>(machine: &Machine<C>, id: &str) -> Result<StateId, CheckpointError> {
    machine
        .get(id)
        .ok_or_else(|| CheckpointError::UnknownState(id.to_string()))
}

fn lookup_all<C>(machine: &Machine<C>, ids: &[String]) -> Result<Vec<StateId>, CheckpointError> {
    ids.iter().map(|id| lookup(machine, id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, StateBuilder};
    use crate::core::HistoryKind;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Ctx {
        volume: u8,
    }

    fn player() -> Machine<Ctx> {
        MachineBuilder::new("player")
            .context(Ctx::default())
            .initial("off")
            .state(StateBuilder::new("off").on("ON", "on.hist"))
            .state(
                StateBuilder::new("on")
                    .initial("paused")
                    .on("OFF", "off")
                    .state(StateBuilder::new("paused").on("PLAY", "playing"))
                    .state(StateBuilder::new("playing"))
                    .state(StateBuilder::history("hist", HistoryKind::Shallow)),
            )
            .build()
            .unwrap()
    }

    fn checkpoint(machine: &Machine<Ctx>, ids: &[&str]) -> Checkpoint<Ctx> {
        let configuration = ids
            .iter()
            .map(|id| machine.get(id).unwrap())
            .collect::<Configuration>();
        Checkpoint::capture(
            machine,
            &configuration,
            &HistoryRecords::new(),
            Ctx { volume: 4 },
            Status::Running,
            None,
        )
    }

    #[test]
    fn json_round_trip_preserves_everything() {
        let machine = player();
        let original = checkpoint(&machine, &["player", "player.on", "player.on.playing"]);

        let json = original.to_json().unwrap();
        let decoded: Checkpoint<Ctx> = Checkpoint::from_json(&json).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(
            decoded.configuration,
            vec!["player", "player.on", "player.on.playing"]
        );
    }

    #[test]
    fn resolve_rebuilds_configuration_and_history() {
        let machine = player();
        let mut saved = checkpoint(&machine, &["player", "player.off"]);
        saved
            .history
            .insert("player.on.hist".to_string(), vec!["player.on.playing".to_string()]);

        let (configuration, history) = saved.resolve(&machine).unwrap();

        assert!(machine.state_value(&configuration).matches("off"));
        let hist = machine.get("player.on.hist").unwrap();
        assert_eq!(history.get(hist), Some(&[machine.get("player.on.playing").unwrap()][..]));
    }

    #[test]
    fn resolve_rejects_foreign_and_broken_checkpoints() {
        let machine = player();

        let mut foreign = checkpoint(&machine, &["player", "player.off"]);
        foreign.machine_id = "radio".to_string();
        assert!(matches!(
            foreign.resolve(&machine),
            Err(CheckpointError::MachineMismatch { .. })
        ));

        let mut future = checkpoint(&machine, &["player", "player.off"]);
        future.version = CHECKPOINT_VERSION + 1;
        assert!(matches!(
            future.resolve(&machine),
            Err(CheckpointError::UnsupportedVersion { .. })
        ));

        let mut unknown = checkpoint(&machine, &["player", "player.off"]);
        unknown.configuration.push("player.standby".to_string());
        assert_eq!(
            unknown.resolve(&machine).unwrap_err(),
            CheckpointError::UnknownState("player.standby".to_string())
        );

        let both = checkpoint(&machine, &["player", "player.off", "player.on", "player.on.paused"]);
        assert!(matches!(
            both.resolve(&machine),
            Err(CheckpointError::InvalidConfiguration(_))
        ));

        let mut not_history = checkpoint(&machine, &["player", "player.off"]);
        not_history
            .history
            .insert("player.on".to_string(), vec!["player.on.paused".to_string()]);
        assert_eq!(
            not_history.resolve(&machine).unwrap_err(),
            CheckpointError::NotHistory("player.on".to_string())
        );
    }

    #[test]
    fn from_json_reports_garbage() {
        assert!(matches!(
            Checkpoint::<Ctx>::from_json("{\"version\": 1"),
            Err(CheckpointError::DeserializationFailed(_))
        ));
    }
}
