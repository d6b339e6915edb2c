//! Requester-side notarisation sub-flow.

use crate::messages::{notary_topic, NotaryResponse, SignRequest};
use accord_core::{AccordError, NotaryError, SignedTransaction, TransactionSignature};
use accord_flow::{FlowCtx, FlowError, FlowResult};
use tracing::debug;

/// Obtain the notary's signature over `tx`.
///
/// Asserts the transaction's inputs are all under the declared notary, does
/// the handshake, and verifies whatever comes back: a returned signature
/// must be by the notary's own key over the transaction's wire bytes (a
/// mismatch is a protocol violation, not a conflict), and conflict evidence
/// must verify against the notary's public key before it is treated as
/// authoritative.
pub async fn notarise(
    ctx: FlowCtx,
    tx: SignedTransaction,
) -> FlowResult<TransactionSignature> {
    let notary = tx
        .wire
        .notary
        .clone()
        .ok_or_else(|| FlowError::violation("transaction declares no notary"))?;
    let txid = tx.id()?;
    let wire_bytes = tx.wire.wire_bytes()?;

    // Every input whose producing transaction we hold must be under the
    // same notary; a mixed-notary transaction needs a notary change first.
    for input in &tx.wire.inputs {
        if let Ok(producer) = ctx.hub().tx_store.get(&input.txid) {
            let state = producer
                .wire
                .outputs
                .get(input.index as usize)
                .ok_or_else(|| AccordError::invalid(format!("dangling input {input}")))?;
            if state.notary != notary {
                return Err(AccordError::invalid(format!(
                    "input {input} is under notary {}, not {}",
                    state.notary, notary
                ))
                .into());
            }
        }
    }

    ctx.progress().set_step("Requesting notary signature");
    let mut session = ctx.initiate(&notary, &notary_topic()).await?;
    let request = SignRequest {
        tx,
        requester: ctx.me().name.clone(),
    };
    let response = session
        .send_and_receive::<_, NotaryResponse>(&request)
        .await?;

    ctx.progress().set_step("Validating response");
    let verified = response
        .unwrap(|resp| {
            match &resp {
                NotaryResponse::Signature(sig) => {
                    if sig.by != notary.signer_key() {
                        return Err(AccordError::crypto(
                            "signature is not by the notary's own key",
                        ));
                    }
                    sig.verify(&wire_bytes)?;
                }
                NotaryResponse::Error(NotaryError::Conflict(evidence)) => {
                    evidence.verify(&notary.key)?;
                    if evidence.conflict.rejected_txid != txid {
                        return Err(AccordError::crypto(
                            "conflict evidence names a different transaction",
                        ));
                    }
                }
                NotaryResponse::Error(_) => {}
            }
            Ok(resp)
        })
        .map_err(|e| FlowError::violation(e.to_string()))?;

    match verified {
        NotaryResponse::Signature(sig) => {
            debug!(tx = %txid, "notary signature obtained");
            Ok(sig)
        }
        NotaryResponse::Error(error) => Err(FlowError::Notary(error)),
    }
}
