//! Scenario catalog and resolution.
//!
//! A scenario is a set of canned response fragments selected by an opaque
//! key. Every entry of the catalog is partial; a group an entry omits is
//! taken from the `default` entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::error::Error;

/// Key of the fallback scenario.
pub const DEFAULT_SCENARIO: &str = "default";

/// Key of the load-test scenario whose subject changes on every resolution.
pub const LOAD_TEST_SCENARIO: &str = "userPerformanceTest";

const EMBEDDED_CATALOG: &str = include_str!("../data/scenarios.json");

/// User information returned by the userinfo endpoint.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UserInfo {
    /// Subject.
    pub sub: String,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the email address is verified.
    #[serde(default)]
    pub email_verified: bool,
    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Whether the phone number is verified.
    #[serde(default)]
    pub phone_number_verified: bool,
    /// Public subject ID used by the account management API.
    #[serde(
        default,
        rename = "publicSubjectId",
        skip_serializing_if = "Option::is_none",
    )]
    pub public_subject_id: Option<String>,
    /// Last update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Priority of an MFA method.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityIdentifier {
    /// Primary method. Exactly one per user.
    Default,
    /// Secondary method.
    Backup,
}

/// Kind-specific part of an MFA method.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "mfaMethodType")]
pub enum MethodDetail {
    /// Text message.
    #[serde(rename = "SMS")]
    Sms {
        /// Phone number the code is sent to.
        #[serde(rename = "phoneNumber")]
        phone_number: String,
    },
    /// Authenticator app.
    #[serde(rename = "AUTH_APP")]
    AuthApp {
        /// Shared secret.
        credential: String,
    },
}

impl MethodDetail {
    /// Returns if the method is an authenticator app.
    pub fn is_auth_app(&self) -> bool {
        matches!(self, MethodDetail::AuthApp { .. })
    }
}

/// MFA method.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaMethod {
    /// Identifier unique within the user.
    pub mfa_identifier: String,
    /// Priority.
    pub priority_identifier: PriorityIdentifier,
    /// Method.
    pub method: MethodDetail,
    /// Whether the method is verified.
    #[serde(default)]
    pub method_verified: bool,
}

impl MfaMethod {
    /// Returns if the method is the default one.
    pub fn is_default(&self) -> bool {
        self.priority_identifier == PriorityIdentifier::Default
    }
}

/// Status override honored by the resource endpoints.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HttpResponse {
    /// Status code. `200` means no override.
    pub code: u16,
    /// Error message.
    #[serde(default)]
    pub message: String,
}

impl HttpResponse {
    /// Returns if the fragment overrides the normal response.
    pub fn is_override(&self) -> bool {
        self.code != 200
    }
}

/// Outcome of sending an OTP notification.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OtpNotification {
    /// Whether sending succeeds.
    pub success: bool,
    /// Error code of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// Account interventions.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Interventions {
    /// Temporarily suspended.
    #[serde(default)]
    pub suspended: bool,
    /// Permanently blocked.
    #[serde(default)]
    pub blocked: bool,
}

/// Whether userinfo is returned as a signed JWT.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoSigned {
    /// `true` for a signed JWT, `false` for plain JSON.
    pub is_signed: bool,
}

/// Entry of the scenario catalog.
///
/// An absent group falls back to the `default` entry.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScenarioFragment {
    /// User information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo: Option<UserInfo>,
    /// MFA methods in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_methods: Option<Vec<MfaMethod>>,
    /// Status override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_response: Option<HttpResponse>,
    /// OTP notification outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_notification: Option<OtpNotification>,
    /// Interventions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interventions: Option<Interventions>,
    /// Userinfo signing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info_signed: Option<UserInfoSigned>,
}

impl ScenarioFragment {
    /// Fills every absent group with the one of `fallback`.
    pub fn merge(self, fallback: &ScenarioFragment) -> ScenarioFragment {
        let ScenarioFragment {
            userinfo,
            mfa_methods,
            http_response,
            otp_notification,
            interventions,
            user_info_signed,
        } = self;
        ScenarioFragment {
            userinfo: userinfo.or_else(|| fallback.userinfo.clone()),
            mfa_methods: mfa_methods.or_else(|| fallback.mfa_methods.clone()),
            http_response: http_response.or_else(|| fallback.http_response.clone()),
            otp_notification: otp_notification
                .or_else(|| fallback.otp_notification.clone()),
            interventions: interventions.or_else(|| fallback.interventions.clone()),
            user_info_signed: user_info_signed
                .or_else(|| fallback.user_info_signed.clone()),
        }
    }
}

/// Scenario resolved for a key.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedScenario {
    /// Key of the catalog entry actually used.
    ///
    /// `default` if the requested key is not in the catalog.
    pub key: String,
    /// Merged fragment.
    pub fragment: ScenarioFragment,
}

impl ResolvedScenario {
    /// Returns the status override if any.
    pub fn http_response_override(&self) -> Option<&HttpResponse> {
        self.fragment.http_response.as_ref().filter(|r| r.is_override())
    }

    /// Returns if userinfo has to be signed.
    ///
    /// Signed unless configured otherwise.
    pub fn is_userinfo_signed(&self) -> bool {
        self.fragment.user_info_signed.as_ref().map_or(true, |s| s.is_signed)
    }
}

/// Read-only catalog of scenarios.
#[derive(Clone, Debug)]
pub struct ScenarioCatalog {
    entries: BTreeMap<String, ScenarioFragment>,
}

impl ScenarioCatalog {
    /// Parses a catalog in JSON.
    ///
    /// Fails if there is no `default` entry.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let entries: BTreeMap<String, ScenarioFragment> = serde_json::from_str(json)
            .map_err(|e| Error::Catalog(e.to_string()))?;
        if !entries.contains_key(DEFAULT_SCENARIO) {
            return Err(Error::Catalog("no default scenario".into()));
        }
        Ok(Self { entries })
    }

    /// Loads the catalog built into the binary.
    pub fn embedded() -> Result<Self, Error> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    /// Loads a catalog from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Catalog(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Loads the catalog at `SCENARIO_CATALOG_PATH` if it is set, or the
    /// embedded one otherwise.
    pub fn from_env() -> Result<Self, Error> {
        match env::var("SCENARIO_CATALOG_PATH") {
            Ok(path) => {
                info!("loading scenario catalog: {path}");
                Self::from_path(path)
            }
            Err(_) => Self::embedded(),
        }
    }

    /// Returns if the catalog has an entry for a given key.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys of the catalog. `default` comes first, then the others in
    /// lexicographical order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(DEFAULT_SCENARIO).chain(
            self.entries.keys()
                .map(String::as_str)
                .filter(|k| *k != DEFAULT_SCENARIO),
        )
    }

    /// Resolves the scenario for a given key.
    ///
    /// An unknown key falls back to `default`. After merging, the email
    /// address is rewritten to `{key}@example.org` so that callers can tell
    /// which entry was used, and the load-test scenario gets a fresh subject.
    pub fn resolve(&self, key: &str) -> ResolvedScenario {
        let (key, entry) = match self.entries.get_key_value(key) {
            Some((key, entry)) => (key.as_str(), entry),
            None => (DEFAULT_SCENARIO, self.default_entry()),
        };
        let mut fragment = entry.clone().merge(self.default_entry());
        if let Some(userinfo) = fragment.userinfo.as_mut() {
            if userinfo.email.is_some() {
                userinfo.email = Some(format!("{key}@example.org"));
            }
            if key == LOAD_TEST_SCENARIO {
                userinfo.sub = Uuid::new_v4().to_string();
            }
        }
        ResolvedScenario {
            key: key.to_string(),
            fragment,
        }
    }

    fn default_entry(&self) -> &ScenarioFragment {
        // from_json guarantees the presence
        static EMPTY: ScenarioFragment = ScenarioFragment {
            userinfo: None,
            mfa_methods: None,
            http_response: None,
            otp_notification: None,
            interventions: None,
            user_info_signed: None,
        };
        self.entries.get(DEFAULT_SCENARIO).unwrap_or(&EMPTY)
    }
}
