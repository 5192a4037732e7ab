//! Bearer-token principals.
//!
//! A token is `<account_id>.<hex hmac-sha256(SECRET_KEY, account_id)>`. Handlers
//! take [`Principal`] when a user is required, or `Option<Principal>` to decide
//! themselves how to reject anonymous callers.

use crate::error::AppError;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::future::{ready, Ready};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, account_id: i64) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac key of any size");
        mac.update(account_id.to_string().as_bytes());
        mac
    }

    pub fn sign(&self, account_id: i64) -> String {
        let tag = self.mac(account_id).finalize().into_bytes();
        format!("{}.{}", account_id, hex::encode(tag))
    }

    /// Account id carried by `token`, if the signature checks out.
    pub fn verify(&self, token: &str) -> Option<i64> {
        let (id, tag) = token.split_once('.')?;
        let account_id = id.parse::<i64>().ok()?;
        let tag = hex::decode(tag).ok()?;
        self.mac(account_id).verify_slice(&tag).ok()?;
        Some(account_id)
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub account_id: i64,
}

fn principal_from_request(req: &HttpRequest) -> Option<Principal> {
    let signer = req.app_data::<web::Data<TokenSigner>>()?;
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    signer
        .verify(token.trim())
        .map(|account_id| Principal { account_id })
}

impl FromRequest for Principal {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(principal_from_request(req).ok_or_else(|| {
            AppError::Unauthenticated("authentication required".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn signed_token_round_trips() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign(42);
        assert!(token.starts_with("42."));
        assert_eq!(signer.verify(&token), Some(42));
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign(42);
        let forged = token.replacen("42", "43", 1);

        assert_eq!(signer.verify(&forged), None);
        assert_eq!(TokenSigner::new("other").verify(&token), None);
        assert_eq!(signer.verify("42"), None);
        assert_eq!(signer.verify("42.zz"), None);
    }

    #[actix_web::test]
    async fn extracts_principal_from_bearer_header() {
        let signer = TokenSigner::new("secret");
        let req = TestRequest::default()
            .app_data(web::Data::new(signer.clone()))
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", signer.sign(7))))
            .to_http_request();

        let principal = Principal::extract(&req).await.unwrap();
        assert_eq!(principal.account_id, 7);
    }

    #[actix_web::test]
    async fn missing_header_is_unauthenticated() {
        let req = TestRequest::default()
            .app_data(web::Data::new(TokenSigner::new("secret")))
            .to_http_request();

        assert!(matches!(
            Principal::extract(&req).await,
            Err(AppError::Unauthenticated(_))
        ));
        assert_eq!(Option::<Principal>::extract(&req).await.unwrap(), None);
    }
}
