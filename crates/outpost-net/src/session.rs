//! Last-known join/input state re-sent on every new connection.

use std::collections::BTreeMap;

use outpost_protocol::{ClientMessage, InputPayload, InputState, JoinRequest};

/// Joins and inputs are tracked independently: an input recorded before its
/// player joins is still replayed, and a re-join keeps the last input.
#[derive(Debug, Default)]
pub struct SessionReplay {
    joins: BTreeMap<String, JoinRequest>,
    inputs: BTreeMap<String, InputState>,
}

impl SessionReplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_join(&mut self, request: JoinRequest) {
        self.joins.insert(request.player_id.clone(), request);
    }

    pub fn record_leave(&mut self, player_id: &str) {
        self.joins.remove(player_id);
        self.inputs.remove(player_id);
    }

    pub fn record_input(&mut self, player_id: &str, input: InputState) {
        self.inputs.insert(player_id.to_string(), input);
    }

    pub fn is_joined(&self, player_id: &str) -> bool {
        self.joins.contains_key(player_id)
    }

    /// Every join in ascending player-id order, then every input in
    /// ascending player-id order.
    pub fn replay(&self) -> Vec<ClientMessage> {
        let mut joins: Vec<&JoinRequest> = self.joins.values().collect();
        joins.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        let mut inputs: Vec<(&String, &InputState)> = self.inputs.iter().collect();
        inputs.sort_by(|a, b| a.0.cmp(b.0));

        joins
            .into_iter()
            .map(|request| ClientMessage::Join(request.clone()))
            .chain(inputs.into_iter().map(|(player_id, input)| {
                ClientMessage::Input(InputPayload {
                    player_id: player_id.clone(),
                    input: *input,
                })
            }))
            .collect()
    }
}
