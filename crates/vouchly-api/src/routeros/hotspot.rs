// RouterOS hotspot endpoints
//
// Users, user profiles and active sessions under `/ip/hotspot`.

use serde_json::json;
use tracing::debug;

use crate::error::Error;
use crate::routeros::client::RouterOsClient;
use crate::routeros::models::{
    ActiveSession, HotspotProfile, HotspotUser, LoginRequest, NewHotspotUser, ProfileSpec,
};

const USERS: &str = "ip/hotspot/user";
const PROFILES: &str = "ip/hotspot/user/profile";
const ACTIVE: &str = "ip/hotspot/active";

impl RouterOsClient {
    // ── Users ────────────────────────────────────────────────────────

    /// Look up hotspot users by exact name.
    ///
    /// `GET /rest/ip/hotspot/user?name={name}`
    pub async fn find_users(&self, name: &str) -> Result<Vec<HotspotUser>, Error> {
        let url = self.rest_url_filtered(USERS, "name", name)?;
        self.get(url).await
    }

    /// Create a hotspot user.
    ///
    /// `PUT /rest/ip/hotspot/user`
    pub async fn add_user(&self, user: &NewHotspotUser) -> Result<HotspotUser, Error> {
        let url = self.rest_url(USERS)?;
        debug!(profile = %user.profile, "adding hotspot user");
        self.put(url, user).await
    }

    /// Delete a hotspot user by RouterOS `.id`.
    ///
    /// `DELETE /rest/ip/hotspot/user/{id}`
    pub async fn remove_user_by_id(&self, id: &str) -> Result<(), Error> {
        let url = self.item_url(USERS, id)?;
        debug!(id, "removing hotspot user");
        self.delete(url).await
    }

    // ── Profiles ─────────────────────────────────────────────────────

    /// Look up user profiles by exact name.
    ///
    /// `GET /rest/ip/hotspot/user/profile?name={name}`
    pub async fn find_profiles(&self, name: &str) -> Result<Vec<HotspotProfile>, Error> {
        let url = self.rest_url_filtered(PROFILES, "name", name)?;
        self.get(url).await
    }

    /// Create a user profile.
    ///
    /// `PUT /rest/ip/hotspot/user/profile`
    pub async fn add_profile(&self, spec: &ProfileSpec) -> Result<HotspotProfile, Error> {
        let url = self.rest_url(PROFILES)?;
        debug!(name = %spec.name, rate_limit = %spec.rate_limit, "adding hotspot profile");
        self.put(url, spec).await
    }

    /// Update an existing user profile in place.
    ///
    /// `PATCH /rest/ip/hotspot/user/profile/{id}`
    pub async fn update_profile(
        &self,
        id: &str,
        spec: &ProfileSpec,
    ) -> Result<HotspotProfile, Error> {
        let url = self.item_url(PROFILES, id)?;
        debug!(id, name = %spec.name, "updating hotspot profile");
        self.patch(url, spec).await
    }

    // ── Active sessions ──────────────────────────────────────────────

    /// List every logged-in hotspot client.
    ///
    /// `GET /rest/ip/hotspot/active`
    pub async fn list_active(&self) -> Result<Vec<ActiveSession>, Error> {
        let url = self.rest_url(ACTIVE)?;
        self.get(url).await
    }

    /// List active sessions belonging to one hotspot user.
    ///
    /// `GET /rest/ip/hotspot/active?user={user}`
    pub async fn find_active(&self, user: &str) -> Result<Vec<ActiveSession>, Error> {
        let url = self.rest_url_filtered(ACTIVE, "user", user)?;
        self.get(url).await
    }

    /// Log a client in on behalf of a hotspot user.
    ///
    /// `POST /rest/ip/hotspot/active/login`
    pub async fn login(&self, request: &LoginRequest) -> Result<(), Error> {
        let url = self.rest_url(&format!("{ACTIVE}/login"))?;
        debug!(mac = ?request.mac_address, "hotspot login");
        let _: serde_json::Value = self.post(url, request).await?;
        Ok(())
    }

    /// Kick an active session by RouterOS `.id`.
    ///
    /// `POST /rest/ip/hotspot/active/remove` with `{".id": "..."}`
    pub async fn remove_active(&self, id: &str) -> Result<(), Error> {
        let url = self.rest_url(&format!("{ACTIVE}/remove"))?;
        debug!(id, "removing active session");
        let _: serde_json::Value = self.post(url, &json!({ ".id": id })).await?;
        Ok(())
    }
}
