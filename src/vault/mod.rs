// Tokenvault - Vault Module
//
// The caller-facing credential vault and its one-shot provisioning gate.

mod facade;
mod gate;

pub use facade::CredentialVault;
pub use gate::InitGate;
