//! Notary change: a state-replacement instance whose modification is the
//! new notary identity.
//!
//! Acceptors refuse destinations that do not run a notary service according
//! to the directory. The replacement transaction is committed by the *old*
//! notary (it consumes a state under the old notary's control); the output
//! state is placed under the new one.

use crate::messages::Proposal;
use crate::replace::{self, ReplacementScheme};
use accord_core::{Command, Party, SignedTransaction, StateRef, TransactionState, WireTransaction};
use accord_flow::{FlowCtx, FlowManager, FlowResult, ServiceHandle, Topic};
use async_trait::async_trait;
use std::sync::Arc;

/// Topic of the notary-change protocol.
pub const NOTARY_CHANGE_TOPIC: &str = "platform.notary.change";

/// The notary-change replacement scheme.
#[derive(Default)]
pub struct NotaryChange;

impl NotaryChange {
    /// Shared scheme instance
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl ReplacementScheme for NotaryChange {
    type Modification = Party;

    fn topic(&self) -> Topic {
        Topic::new(NOTARY_CHANGE_TOPIC)
    }

    fn assemble_tx(
        &self,
        _ctx: &FlowCtx,
        state_ref: StateRef,
        current: &TransactionState,
        new_notary: &Party,
    ) -> FlowResult<SignedTransaction> {
        let replacement = TransactionState {
            notary: new_notary.clone(),
            ..current.clone()
        };
        let signers = current.participants.iter().map(Party::signer_key).collect();
        Ok(SignedTransaction::unsigned(WireTransaction {
            inputs: vec![state_ref],
            outputs: vec![replacement],
            commands: vec![Command {
                name: "NotaryChange".into(),
                signers,
            }],
            // The old notary commits the consumption of the old state.
            notary: Some(current.notary.clone()),
            time_window: None,
        }))
    }

    async fn verify_proposal(
        &self,
        ctx: &FlowCtx,
        proposal: &Proposal<Party>,
    ) -> Result<(), String> {
        let new_notary = &proposal.modification;
        if !ctx.hub().directory.is_notary(new_notary) {
            return Err(format!("{new_notary} does not run a notary service"));
        }
        match proposal.tx.wire.outputs.first() {
            Some(output) if output.notary == *new_notary => Ok(()),
            Some(_) => Err("output state is not under the proposed notary".into()),
            None => Err("proposal has no output state".into()),
        }
    }
}

/// Instigate a notary change for `state_ref`.
pub async fn change_notary(
    ctx: FlowCtx,
    state_ref: StateRef,
    new_notary: Party,
) -> FlowResult<SignedTransaction> {
    replace::instigate(ctx, NotaryChange::new(), state_ref, new_notary).await
}

/// Register the acceptor side of the notary-change protocol.
pub fn register_notary_change_acceptor(manager: &FlowManager) -> ServiceHandle {
    replace::register_acceptor(manager, NotaryChange::new())
}
