// In-memory gateway fakes for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::GatewayError;
use crate::gateway::{
    CheckoutTicket, HotspotUserSpec, PaymentGateway, ProfileChange, ProfileRequest, RawSession,
    RouterGateway, UserRecord,
};
use crate::model::MacAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Login {
    pub user: String,
    pub password: String,
    pub mac: MacAddress,
    pub ip: Option<IpAddr>,
}

#[derive(Default)]
struct RouterState {
    users: HashMap<String, HotspotUserSpec>,
    profiles: HashMap<String, ProfileRequest>,
    active: Vec<RawSession>,
    logins: Vec<Login>,
    deauthorized: Vec<String>,
    profile_creates: usize,
    list_calls: usize,
    failures: HashMap<&'static str, VecDeque<GatewayError>>,
}

/// Router that keeps users and profiles in maps and fails on request.
#[derive(Default)]
pub(crate) struct FakeRouter {
    state: Mutex<RouterState>,
}

impl FakeRouter {
    fn take_failure(&self, operation: &'static str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        match state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn fail_next_transient(&self, operation: &'static str) {
        self.push_failure(GatewayError::Transient {
            operation,
            message: "connection reset".into(),
        });
    }

    pub fn fail_next_rejected(&self, operation: &'static str) {
        self.push_failure(GatewayError::Rejected {
            operation,
            message: "failure: invalid user".into(),
        });
    }

    fn push_failure(&self, err: GatewayError) {
        let mut state = self.state.lock().unwrap();
        state
            .failures
            .entry(err.operation())
            .or_default()
            .push_back(err);
    }

    pub fn set_active(&self, sessions: Vec<RawSession>) {
        self.state.lock().unwrap().active = sessions;
    }

    pub fn profile(&self, name: &str) -> Option<ProfileRequest> {
        self.state.lock().unwrap().profiles.get(name).cloned()
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.state.lock().unwrap().users.contains_key(name)
    }

    pub fn user_profile(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.users.get(name).map(|u| u.profile.clone())
    }

    pub fn profile_creates(&self) -> usize {
        self.state.lock().unwrap().profile_creates
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn logins(&self) -> Vec<Login> {
        self.state.lock().unwrap().logins.clone()
    }

    pub fn deauthorized(&self) -> Vec<String> {
        self.state.lock().unwrap().deauthorized.clone()
    }
}

#[async_trait]
impl RouterGateway for FakeRouter {
    async fn authorize_client(
        &self,
        identity: &str,
        secret: &SecretString,
        device_mac: &MacAddress,
        client_ip: Option<IpAddr>,
    ) -> Result<(), GatewayError> {
        self.take_failure("authorize_client")?;
        let mut state = self.state.lock().unwrap();
        let known = state
            .users
            .get(identity)
            .is_some_and(|u| u.password.expose_secret() == secret.expose_secret());
        if !known {
            return Err(GatewayError::Rejected {
                operation: "authorize_client",
                message: "invalid username or password".into(),
            });
        }
        state.logins.push(Login {
            user: identity.to_owned(),
            password: secret.expose_secret().to_owned(),
            mac: device_mac.clone(),
            ip: client_ip,
        });
        Ok(())
    }

    async fn deauthorize_client(&self, identity: &str) -> Result<(), GatewayError> {
        self.take_failure("deauthorize_client")?;
        let mut state = self.state.lock().unwrap();
        state
            .active
            .retain(|s| s.user.as_deref() != Some(identity));
        state.deauthorized.push(identity.to_owned());
        Ok(())
    }

    async fn ensure_profile(&self, profile: &ProfileRequest) -> Result<ProfileChange, GatewayError> {
        self.take_failure("ensure_profile")?;
        let mut state = self.state.lock().unwrap();
        let change = match state.profiles.get(&profile.name) {
            None => {
                state.profile_creates += 1;
                ProfileChange::Created
            }
            Some(existing) if existing == profile => ProfileChange::Unchanged,
            Some(_) => ProfileChange::Updated,
        };
        state.profiles.insert(profile.name.clone(), profile.clone());
        Ok(change)
    }

    async fn list_active_sessions(&self) -> Result<Vec<RawSession>, GatewayError> {
        self.take_failure("list_active_sessions")?;
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(state.active.clone())
    }

    async fn find_user(&self, identity: &str) -> Result<Option<UserRecord>, GatewayError> {
        self.take_failure("find_user")?;
        let state = self.state.lock().unwrap();
        Ok(state.users.get(identity).map(|u| UserRecord {
            router_id: format!("*{identity}"),
            name: u.name.clone(),
            profile: Some(u.profile.clone()),
            disabled: false,
        }))
    }

    async fn add_user(&self, user: &HotspotUserSpec) -> Result<(), GatewayError> {
        self.take_failure("add_user")?;
        let mut state = self.state.lock().unwrap();
        state.users.insert(user.name.clone(), user.clone());
        Ok(())
    }

    async fn remove_user(&self, identity: &str) -> Result<(), GatewayError> {
        self.take_failure("remove_user")?;
        self.state.lock().unwrap().users.remove(identity);
        Ok(())
    }
}

// ── Payments ─────────────────────────────────────────────────────────

#[derive(Default)]
struct PaymentState {
    next: usize,
    pushes: Vec<(String, u64, String)>,
    fail_next: Option<GatewayError>,
}

/// Payment gateway that hands out `ws_CO_<n>` checkout ids.
#[derive(Default)]
pub(crate) struct FakePayments {
    state: Mutex<PaymentState>,
}

impl FakePayments {
    pub fn fail_next(&self, err: GatewayError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    /// `(phone, amount, reference)` of every accepted push.
    pub fn pushes(&self) -> Vec<(String, u64, String)> {
        self.state.lock().unwrap().pushes.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePayments {
    fn name(&self) -> &str {
        "mpesa"
    }

    async fn initiate(
        &self,
        phone: &str,
        amount: u64,
        reference: &str,
        _description: &str,
    ) -> Result<CheckoutTicket, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        state.next += 1;
        state
            .pushes
            .push((phone.to_owned(), amount, reference.to_owned()));
        Ok(CheckoutTicket {
            checkout_id: format!("ws_CO_{}", state.next),
            customer_message: Some("Success. Request accepted for processing".into()),
        })
    }
}
