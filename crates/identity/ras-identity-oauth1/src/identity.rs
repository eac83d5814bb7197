//! Mapping of a provider profile onto a claims identity.

use crate::types::{AccessToken, Profile};
use ras_identity_core::{Claim, ClaimsIdentity, IdentityResult, claim_types};

/// Builds the identity emitted for a completed sign-in.
///
/// Provider specific claims use the `urn:<provider>:<field>` form, where
/// `<provider>` is the lowercased authentication type.
#[derive(Debug, Clone)]
pub struct IdentityMapper {
    template: ClaimsIdentity,
    urn_prefix: String,
}

impl IdentityMapper {
    pub fn new(authentication_type: &str) -> IdentityResult<Self> {
        Ok(Self {
            template: ClaimsIdentity::new(authentication_type)?,
            urn_prefix: format!("urn:{}:", authentication_type.to_lowercase()),
        })
    }

    pub fn member_id_claim(&self) -> String {
        format!("{}memberid", self.urn_prefix)
    }

    pub fn nickname_claim(&self) -> String {
        format!("{}nickname", self.urn_prefix)
    }

    pub fn access_token_claim(&self) -> String {
        format!("{}accesstoken", self.urn_prefix)
    }

    /// Missing profile fields produce fewer claims, never an error.
    /// The access token secret is not part of the identity.
    pub fn to_identity(&self, profile: &Profile, access_token: &AccessToken) -> ClaimsIdentity {
        let mut identity = self.template.clone();
        let issuer = identity.authentication_type().to_string();

        if let Some(member_id) = non_blank(&profile.member_id) {
            identity.add_claim(Claim::new(claim_types::NAME_IDENTIFIER, member_id, &issuer));
            identity.add_claim(Claim::new(self.member_id_claim(), member_id, &issuer));
        }
        if let Some(nickname) = non_blank(&profile.nickname) {
            identity.add_claim(Claim::new(claim_types::NAME, nickname, &issuer));
            identity.add_claim(Claim::new(self.nickname_claim(), nickname, &issuer));
        }
        if let Some(email) = non_blank(&profile.email) {
            identity.add_claim(Claim::new(claim_types::EMAIL, email, &issuer));
        }
        identity.add_claim(Claim::new(
            self.access_token_claim(),
            &access_token.token,
            &issuer,
        ));

        identity
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access_token() -> AccessToken {
        AccessToken {
            token: "access-abc".to_string(),
            token_secret: "access-secret".to_string(),
        }
    }

    #[test]
    fn test_full_profile_maps_every_claim() {
        let mapper = IdentityMapper::new("TradeMe").unwrap();
        let profile = Profile::from_json(serde_json::json!({
            "MemberId": 4000123,
            "Nickname": "kiwi_seller",
            "Email": "seller@example.co.nz"
        }))
        .unwrap();

        let identity = mapper.to_identity(&profile, &access_token());

        assert_eq!(identity.authentication_type(), "TradeMe");
        assert!(identity.has_claim(claim_types::NAME_IDENTIFIER, "4000123"));
        assert!(identity.has_claim("urn:trademe:memberid", "4000123"));
        assert!(identity.has_claim(claim_types::NAME, "kiwi_seller"));
        assert!(identity.has_claim("urn:trademe:nickname", "kiwi_seller"));
        assert!(identity.has_claim(claim_types::EMAIL, "seller@example.co.nz"));
        assert!(identity.has_claim("urn:trademe:accesstoken", "access-abc"));
        assert!(identity.claims().iter().all(|c| c.issuer == "TradeMe"));
    }

    #[test]
    fn test_sparse_profile_yields_fewer_claims() {
        let mapper = IdentityMapper::new("TradeMe").unwrap();
        let profile = Profile::from_json(serde_json::json!({ "Nickname": "  " })).unwrap();

        let identity = mapper.to_identity(&profile, &access_token());

        assert_eq!(identity.claims().len(), 1);
        assert_eq!(identity.claims()[0].claim_type, "urn:trademe:accesstoken");
        assert_eq!(identity.name(), None);
    }

    #[test]
    fn test_token_secret_never_mapped() {
        let mapper = IdentityMapper::new("TradeMe").unwrap();
        let profile = Profile::from_json(serde_json::json!({ "MemberId": "1" })).unwrap();

        let identity = mapper.to_identity(&profile, &access_token());

        assert!(
            identity
                .claims()
                .iter()
                .all(|c| !c.value.contains("access-secret"))
        );
    }
}
