#![warn(missing_docs)]

//! Scenario-driven stubs of an OpenID Connect provider and the account
//! management API.

pub mod account;
pub mod audit;
pub mod authorize;
pub mod bearer;
pub mod config;
pub mod correlation;
pub mod discovery;
pub mod error;
pub mod error_response;
pub mod jwt;
pub mod logout;
pub mod mfa_methods;
pub mod parameters;
pub mod resource;
pub mod response;
pub mod scenario;
pub mod sdk_error_ext;
pub mod signer;
pub mod token;
pub mod userinfo;
pub mod validation;
