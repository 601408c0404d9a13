//! Parity-engine operations (`executeSnapRAIDOperation`,
//! `executeNonRaidParityOperation`): triggering a sync/scrub/check/fix run.
//! Reading progress back out is [`crate::reconciler`]'s job, not this
//! module's — a trigger and a status read have very different failure modes
//! and no reason to share a return type.

pub mod nonraid;
pub mod snapraid;
