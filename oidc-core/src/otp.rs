//! OTP service collaborator contract, used only by the factor-setup gate
//! (§4.7) to know whether a TOTP factor is already satisfied. TOTP
//! enrollment/verification itself is out of scope.

use anyhow::Result;

#[async_trait::async_trait]
pub trait OtpService: Send + Sync {
    async fn has_activated_totp(&self, credentials_id: &str) -> Result<bool>;
}

/// Always-inactive implementation, useful for deployments that don't
/// enforce a TOTP factor and for tests.
pub struct NoOtpService;

#[async_trait::async_trait]
impl OtpService for NoOtpService {
    async fn has_activated_totp(&self, _credentials_id: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Compute which enforced factor types still need to be set up for a
/// credentials id: the union of globally enforced factors and any
/// credential-specific ones, minus factors already present on the
/// session's login descriptor.
pub fn factors_to_setup(
    globally_enforced: &[String],
    credential_enforced: &[String],
    already_satisfied: &std::collections::BTreeSet<String>,
) -> Vec<String> {
    let mut required: Vec<String> = globally_enforced
        .iter()
        .chain(credential_enforced.iter())
        .cloned()
        .collect();
    required.sort();
    required.dedup();
    required
        .into_iter()
        .filter(|f| !already_satisfied.contains(f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfied_factors_are_excluded() {
        let globally = vec!["totp".to_string()];
        let per_cred = vec!["webauthn".to_string()];
        let satisfied = std::collections::BTreeSet::from(["totp".to_string()]);
        let missing = factors_to_setup(&globally, &per_cred, &satisfied);
        assert_eq!(missing, vec!["webauthn".to_string()]);
    }

    #[test]
    fn no_missing_factors_when_all_satisfied() {
        let globally = vec!["totp".to_string()];
        let satisfied = std::collections::BTreeSet::from(["totp".to_string()]);
        assert!(factors_to_setup(&globally, &[], &satisfied).is_empty());
    }
}
