//! The notary-side flow.
//!
//! One service flow per incoming handshake: receive a [`SignRequest`], gate
//! on the declared time window, run the pre-commit hook, atomically commit
//! the inputs, and reply with either a signature over the transaction's wire
//! bytes or a typed [`NotaryError`]. Internal failures never cross the wire
//! as stack traces.

use crate::messages::{notary_topic, NotaryResponse, SignRequest};
use crate::uniqueness::UniquenessProvider;
use accord_core::{
    Conflict, NotaryError, SignedConflict, SignedTransaction, TimeWindowChecker,
};
use accord_flow::{FlowCtx, FlowManager, FlowResult, Handshake, ServiceHandle};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The notary consensus service.
///
/// With `validating = false` (the base service) the notary never looks at
/// transaction content beyond inputs and time window: verifying contracts
/// would force it to resolve the full dependency chain and see data it has
/// no right to see. The validating variant accepts that trade-off in the
/// other direction and fully verifies before committing. A non-validating
/// notary will therefore commit an invalid transaction's inputs; that is the
/// configured policy, not a defect.
pub struct NotaryService {
    provider: Arc<dyn UniquenessProvider>,
    checker: Arc<dyn TimeWindowChecker>,
    validating: bool,
}

impl NotaryService {
    /// Build a notary over `provider`, gating time windows with `checker`.
    pub fn new(
        provider: Arc<dyn UniquenessProvider>,
        checker: Arc<dyn TimeWindowChecker>,
        validating: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            checker,
            validating,
        })
    }

    /// Register the service with `manager` on the notary topic.
    pub fn register(self: &Arc<Self>, manager: &FlowManager) -> ServiceHandle {
        let service = Arc::clone(self);
        manager.register_service(notary_topic(), move |ctx, handshake| {
            let service = Arc::clone(&service);
            async move { service.handle(ctx, handshake).await }
        })
    }

    async fn handle(&self, ctx: FlowCtx, handshake: Handshake) -> FlowResult<()> {
        let mut session = ctx.accept(&notary_topic(), &handshake);
        ctx.progress().set_step("Awaiting request");
        let mut request: SignRequest = session.receive().await?.unwrap(|req: SignRequest| {
            // Structural check only; the typed refusals come from `evaluate`.
            req.tx.id()?;
            Ok(req)
        })?;
        let requester = session.peer().name.clone();
        if request.requester != requester {
            // The commit is attributed to whoever opened the session; a
            // claimed identity never enters the ledger or conflict evidence.
            warn!(claimed = %request.requester, actual = %requester, "request names a different requester");
            request.requester = requester;
        }
        let response = self.process(&ctx, request).await;
        ctx.progress().set_step("Replying");
        session.send(&response).await
    }

    async fn process(&self, ctx: &FlowCtx, request: SignRequest) -> NotaryResponse {
        match self.evaluate(ctx, &request).await {
            Ok(signature) => NotaryResponse::Signature(signature),
            Err(error) => NotaryResponse::Error(error),
        }
    }

    /// The commit pipeline. Every early return is a typed [`NotaryError`].
    async fn evaluate(
        &self,
        ctx: &FlowCtx,
        request: &SignRequest,
    ) -> Result<accord_core::TransactionSignature, NotaryError> {
        let tx = &request.tx;
        let txid = tx
            .id()
            .map_err(|e| NotaryError::TransactionInvalid(e.to_string()))?;

        match &tx.wire.notary {
            Some(notary) if notary == ctx.me() => {}
            _ => {
                return Err(NotaryError::TransactionInvalid(
                    "transaction does not name this notary".into(),
                ))
            }
        }

        ctx.progress().set_step("Checking time window");
        if let Some(window) = &tx.wire.time_window {
            if !self.checker.is_valid(window) {
                debug!(tx = %txid, "time window invalid");
                return Err(NotaryError::TimestampInvalid);
            }
        }

        if self.validating {
            ctx.progress().set_step("Verifying transaction");
            self.verify_fully(ctx, &request.requester, tx).await?;
        }

        ctx.progress().set_step("Committing inputs");
        match self
            .provider
            .commit(&tx.wire.inputs, txid, &request.requester)
        {
            Ok(()) => {
                info!(tx = %txid, requester = %request.requester, "notarised");
                let bytes = tx
                    .wire
                    .wire_bytes()
                    .map_err(|e| NotaryError::TransactionInvalid(e.to_string()))?;
                Ok(ctx.hub().identity.sign(&bytes))
            }
            Err(consumed) => {
                info!(tx = %txid, conflicts = consumed.len(), "double spend detected");
                let conflict = Conflict {
                    rejected_txid: txid,
                    consumed,
                };
                let evidence = SignedConflict::sign(conflict, ctx.hub().identity.signing_key())
                    .map_err(|e| NotaryError::TransactionInvalid(e.to_string()))?;
                Err(NotaryError::Conflict(evidence))
            }
        }
    }

    /// Pre-commit hook of the validating variant: resolve the dependency
    /// chain from the requester, demand the full signature set, and run
    /// contract verification. Verification failures become
    /// `TransactionInvalid`; absent signatures are an authorization failure
    /// of their own.
    async fn verify_fully(
        &self,
        ctx: &FlowCtx,
        requester: &accord_core::PartyName,
        tx: &SignedTransaction,
    ) -> Result<(), NotaryError> {
        let hub = ctx.hub();
        let from = hub
            .directory
            .resolve(requester)
            .map_err(|e| NotaryError::TransactionInvalid(e.to_string()))?;
        let deps: Vec<_> = tx.wire.inputs.iter().map(|input| input.txid).collect();
        hub.resolver
            .fetch_missing(&deps, &from)
            .await
            .map_err(|e| NotaryError::TransactionInvalid(e.to_string()))?;

        let notary_key = ctx.me().signer_key();
        let missing: Vec<_> = tx.missing_signers(&[notary_key]).into_iter().collect();
        if !missing.is_empty() {
            return Err(NotaryError::SignaturesMissing(missing));
        }
        tx.verify_signatures(&[notary_key])
            .map_err(|e| NotaryError::TransactionInvalid(e.to_string()))?;

        hub.verifier
            .verify(tx, hub.tx_store.as_ref())
            .map_err(|e| NotaryError::TransactionInvalid(e.to_string()))?;
        Ok(())
    }
}
