//! The generic state-replacement protocol.
//!
//! Replaces exactly one ledger state with a modified version, preserving a
//! one-to-one mapping (no merge, split or issue), agreed by every
//! participant of the original state. Concrete protocols supply a
//! [`ReplacementScheme`] rather than subclassing anything: the scheme names
//! the topic, assembles the proposal transaction, and applies the
//! domain-specific acceptance rules.
//!
//! Per role the protocol moves through
//! `INIT -> AWAITING_COUNTERPARTIES | AWAITING_PROPOSAL -> VERIFYING ->
//! SIGNING -> NOTARISING -> DISTRIBUTING -> RECORDED`, or ends at `REFUSED`.
//! There is no retry transition: a refusal or a notary conflict ends the
//! protocol instance.

use crate::messages::{AcceptorResult, FinalSignatureSet, Proposal};
use accord_core::{
    AccordError, Party, SignedTransaction, StateRef, StateReplacementRefused,
    TransactionSignature, TransactionState, TxId,
};
use accord_flow::{
    FlowCtx, FlowError, FlowManager, FlowResult, Handshake, PeerSession, ServiceHandle, Topic,
};
use accord_notary::notarise;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// What a concrete replacement protocol supplies.
#[async_trait]
pub trait ReplacementScheme: Send + Sync + 'static {
    /// Protocol-specific description of the proposed change
    type Modification: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Topic this protocol's sessions run on
    fn topic(&self) -> Topic;

    /// Build the proposal transaction: the old state as its only input, the
    /// modified state as its only output.
    fn assemble_tx(
        &self,
        ctx: &FlowCtx,
        state_ref: StateRef,
        current: &TransactionState,
        modification: &Self::Modification,
    ) -> FlowResult<SignedTransaction>;

    /// Domain-specific acceptance rules, run by each Acceptor before any
    /// signing. An `Err` becomes the refusal detail on the wire.
    async fn verify_proposal(
        &self,
        ctx: &FlowCtx,
        proposal: &Proposal<Self::Modification>,
    ) -> std::result::Result<(), String>;
}

/// Run the Instigator role: propose replacing `state_ref`, gather one
/// signature per participant plus the notary's, record, and distribute the
/// final signature set.
///
/// If any participant refuses, the whole replacement fails with
/// [`FlowError::Refused`] and nothing is recorded anywhere. If the
/// Instigator is the only participant, peer collection is skipped and only
/// the notary signature is obtained.
pub async fn instigate<S: ReplacementScheme>(
    ctx: FlowCtx,
    scheme: Arc<S>,
    state_ref: StateRef,
    modification: S::Modification,
) -> FlowResult<SignedTransaction> {
    let hub = ctx.hub();
    ctx.progress().set_step("Assembling proposal");
    let producer = hub.tx_store.get(&state_ref.txid)?;
    let current = producer
        .wire
        .outputs
        .get(state_ref.index as usize)
        .ok_or_else(|| AccordError::invalid(format!("dangling state {state_ref}")))?
        .clone();
    let unsigned = scheme.assemble_tx(&ctx, state_ref, &current, &modification)?;
    let mut stx = unsigned.with_key(hub.identity.signing_key())?;

    let me = ctx.me().clone();
    let others: Vec<Party> = current
        .participants
        .iter()
        .filter(|p| **p != me)
        .cloned()
        .collect();

    let mut sessions: Vec<PeerSession> = Vec::with_capacity(others.len());
    if !others.is_empty() {
        ctx.progress().set_step("Awaiting counterparties");
        for participant in &others {
            let session = ctx.initiate(participant, &scheme.topic()).await?;
            session
                .send(&Proposal {
                    state_ref,
                    modification: modification.clone(),
                    tx: stx.clone(),
                })
                .await?;
            sessions.push(session);
        }

        let wire_bytes = stx.wire.wire_bytes()?;
        for session in &mut sessions {
            let peer_key = session.peer().signer_key();
            let peer_name = session.peer().name.clone();
            let untrusted = session.receive::<AcceptorResult>().await?;
            let result = untrusted
                .unwrap(|result| {
                    if let AcceptorResult::Signature(sig) = &result {
                        if sig.by != peer_key {
                            return Err(AccordError::crypto(format!(
                                "signature is not by {peer_name}"
                            )));
                        }
                        sig.verify(&wire_bytes)?;
                    }
                    Ok(result)
                })
                .map_err(|e| FlowError::violation(e.to_string()))?;
            match result {
                AcceptorResult::Signature(sig) => {
                    debug!(by = %peer_name, "participant signed");
                    stx = stx.with_signature(sig)?;
                }
                AcceptorResult::Refused(refusal) => {
                    info!(by = %refusal.by, detail = %refusal.detail, "replacement refused");
                    return Err(FlowError::Refused(refusal));
                }
            }
        }
    }

    if stx.wire.notary.is_some() {
        ctx.progress().set_step("Notarising");
        let for_notary = stx.clone();
        let notary_sig = ctx
            .subflow("Requesting notary signature", |sub| {
                notarise(sub, for_notary)
            })
            .await?;
        stx = stx.with_signature(notary_sig)?;
    }

    ctx.progress().set_step("Recording");
    hub.tx_store.record(std::slice::from_ref(&stx))?;

    ctx.progress().set_step("Distributing signatures");
    let final_set = FinalSignatureSet { tx: stx.clone() };
    for session in &sessions {
        session.send(&final_set).await?;
    }
    ctx.progress().set_step("Recorded");
    info!(tx = %stx.id()?, "replacement recorded");
    Ok(stx)
}

/// Run the Acceptor role for one incoming proposal.
///
/// On acceptance: verify, sign, reply, then await the finalized transaction
/// and independently re-verify its signature set before recording. On any
/// verification failure: reply with a typed refusal and end at `REFUSED` —
/// an internal error never crosses the wire as a stack trace.
pub async fn accept<S: ReplacementScheme>(
    ctx: FlowCtx,
    scheme: Arc<S>,
    handshake: Handshake,
) -> FlowResult<()> {
    let mut session = ctx.accept(&scheme.topic(), &handshake);
    ctx.progress().set_step("Awaiting proposal");
    let proposal: Proposal<S::Modification> = session
        .receive()
        .await?
        .unwrap(|p: Proposal<S::Modification>| {
            p.tx.id()?;
            Ok(p)
        })?;

    ctx.progress().set_step("Verifying");
    let proposer = session.peer().clone();
    match evaluate_proposal(&ctx, scheme.as_ref(), &proposer, &proposal).await {
        Ok(signature) => {
            ctx.progress().set_step("Signing");
            session.send(&AcceptorResult::Signature(signature)).await?;
        }
        Err(detail) => {
            let refusal = StateReplacementRefused {
                by: ctx.me().name.clone(),
                state_ref: proposal.state_ref,
                detail,
            };
            info!(state = %refusal.state_ref, detail = %refusal.detail, "refusing proposal");
            session.send(&AcceptorResult::Refused(refusal)).await?;
            ctx.progress().set_step("Refused");
            return Ok(());
        }
    }

    ctx.progress().set_step("Awaiting final signatures");
    let expected_id = proposal.tx.id()?;
    let own_key = ctx.me().signer_key();
    let notary_key = proposal.tx.wire.notary.as_ref().map(|n| n.signer_key());
    let final_tx = session
        .receive::<FinalSignatureSet>()
        .await?
        .unwrap(|set| {
            let tx = set.tx;
            if tx.id()? != expected_id {
                return Err(AccordError::invalid(
                    "final transaction differs from the proposal",
                ));
            }
            tx.verify_signatures(&[])?;
            if let Some(notary_key) = notary_key {
                if !tx.is_signed_by(&notary_key) {
                    return Err(AccordError::crypto("notary signature missing"));
                }
            }
            if !tx.is_signed_by(&own_key) {
                return Err(AccordError::crypto("own signature missing from final set"));
            }
            Ok(tx)
        })
        .map_err(|e| FlowError::violation(e.to_string()))?;

    ctx.hub().tx_store.record(std::slice::from_ref(&final_tx))?;
    ctx.progress().set_step("Recorded");
    Ok(())
}

/// Everything an acceptor checks before signing; an `Err` is the refusal
/// detail sent back.
async fn evaluate_proposal<S: ReplacementScheme>(
    ctx: &FlowCtx,
    scheme: &S,
    proposer: &Party,
    proposal: &Proposal<S::Modification>,
) -> std::result::Result<TransactionSignature, String> {
    scheme.verify_proposal(ctx, proposal).await?;

    let tx = &proposal.tx;
    // The structural shape of a replacement: exactly the proposed state in,
    // exactly one state out.
    if tx.wire.inputs.as_slice() != [proposal.state_ref] {
        return Err("transaction does not consume exactly the proposed state".into());
    }
    if tx.wire.outputs.len() != 1 {
        return Err("replacement must produce exactly one state".into());
    }

    let hub = ctx.hub();
    // A transaction cannot be validated without the history of its inputs;
    // fetch whatever is missing from the proposer first.
    let deps: Vec<TxId> = tx.wire.inputs.iter().map(|input| input.txid).collect();
    hub.resolver
        .fetch_missing(&deps, proposer)
        .await
        .map_err(|e| e.to_string())?;

    let producer = hub
        .tx_store
        .get(&proposal.state_ref.txid)
        .map_err(|e| e.to_string())?;
    let current = producer
        .wire
        .outputs
        .get(proposal.state_ref.index as usize)
        .ok_or("dangling state reference")?;
    if !current.participants.iter().any(|p| p == ctx.me()) {
        return Err("not a participant of the proposed state".into());
    }

    // Attached signatures must be genuine and include the proposer's.
    let bytes = tx.wire.wire_bytes().map_err(|e| e.to_string())?;
    for (by, signature) in &tx.sigs {
        TransactionSignature {
            by: *by,
            signature: *signature,
        }
        .verify(&bytes)
        .map_err(|e| e.to_string())?;
    }
    if !tx.is_signed_by(&proposer.signer_key()) {
        return Err("proposal not signed by its instigator".into());
    }

    hub.verifier
        .verify(tx, hub.tx_store.as_ref())
        .map_err(|e| e.to_string())?;

    tx.sign_with(hub.identity.signing_key())
        .map_err(|e| e.to_string())
}

/// Register the Acceptor role as a service: one flow per incoming proposal.
pub fn register_acceptor<S: ReplacementScheme>(
    manager: &FlowManager,
    scheme: Arc<S>,
) -> ServiceHandle {
    let topic = scheme.topic();
    manager.register_service(topic, move |ctx, handshake| {
        let scheme = Arc::clone(&scheme);
        async move { accept(ctx, scheme, handshake).await }
    })
}
