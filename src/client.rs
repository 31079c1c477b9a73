//! The PATS API client: one login against `/token`, then bearer-authenticated
//! GETs, one method per documented endpoint. Each call is a single blocking
//! request; there is no retry, caching or pagination, matching the API's
//! documented behavior.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::{PatsError, Result};
use crate::models::{Counts, DetectionClass, DetectionFeature, FlightTrackPoint, Section, Spots};
use crate::query::{CountsQuery, DetectionFeaturesQuery, SnappingMode};
use crate::wire;

/// Default request timeout. Video renders happen on demand on the edge and
/// can take the better part of a minute.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// Which PATS deployment to talk to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Server {
    #[default]
    Production,
    /// Experimental deployment, not stable.
    Beta,
    /// Loopback instance for local testing.
    Local,
    Custom(String),
}

impl Server {
    pub fn base_url(&self) -> &str {
        match self {
            Server::Production => "https://pats-c.com",
            Server::Beta => "https://beta.pats-c.com",
            Server::Local => "http://127.0.0.1:5000",
            Server::Custom(url) => url,
        }
    }
}

impl FromStr for Server {
    type Err = PatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "production" => Ok(Server::Production),
            "beta" => Ok(Server::Beta),
            "local" => Ok(Server::Local),
            other if other.starts_with("http://") || other.starts_with("https://") => {
                Ok(Server::Custom(other.trim_end_matches('/').to_string()))
            }
            other => Err(PatsError::InvalidServer(other.to_string())),
        }
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_url())
    }
}

// Response envelopes the endpoints wrap their payloads in.

#[derive(Deserialize)]
struct TokenEnvelope {
    access_token: String,
}

#[derive(Deserialize)]
struct DetectionClassesEnvelope {
    detection_classes: BTreeMap<String, DetectionClass>,
}

#[derive(Deserialize)]
struct SectionsEnvelope {
    sections: Vec<Section>,
}

#[derive(Deserialize)]
struct PhotoListEnvelope {
    photos: Vec<String>,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

#[derive(Clone, Debug)]
pub struct PatsClient {
    server: Server,
    token: String,
    http: reqwest::blocking::Client,
}

impl PatsClient {
    /// Authenticate against `{server}/token` and return a client carrying
    /// the access token. There is no documented token expiry or refresh;
    /// if the token goes stale, log in again.
    pub fn login(server: Server, username: &str, password: &str) -> Result<Self> {
        Self::login_with_timeout(server, username, password, DEFAULT_TIMEOUT)
    }

    pub fn login_with_timeout(
        server: Server,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PatsError::ClientBuild)?;

        debug!("retrieving token from {}", server);
        let response = http
            .post(format!("{}/token", server.base_url()))
            .form(&[("username", username), ("password", password)])
            .send()
            .map_err(|source| PatsError::Transport { endpoint: "/token", source })?;
        let response = check_status("/token", response)?;

        let envelope: TokenEnvelope = response
            .json()
            .map_err(|source| PatsError::Transport { endpoint: "/token", source })?;
        info!("retrieved API token from {}", server);

        Ok(Self {
            server,
            token: envelope.access_token,
            http,
        })
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// All detection classes known to the system, keyed by string-encoded
    /// insect id. Which of these a section actually reports is listed per
    /// section by [`sections`](Self::sections).
    pub fn detection_classes(&self) -> Result<BTreeMap<String, DetectionClass>> {
        let envelope: DetectionClassesEnvelope =
            self.get_json("/api/detection_classes", &[])?;
        Ok(envelope.detection_classes)
    }

    /// All sections the account can see, with their metadata and available
    /// detection classes.
    pub fn sections(&self) -> Result<Vec<Section>> {
        let envelope: SectionsEnvelope = self.get_json("/api/sections", &[])?;
        Ok(envelope.sections)
    }

    /// Sensor locations of a section. `map_snapping` is the legacy 0/1 flag
    /// form of the parameter, kept for backward compatibility; prefer
    /// [`spots_with_snapping`](Self::spots_with_snapping).
    pub fn spots(&self, section_id: i64, map_snapping: bool) -> Result<Spots> {
        self.get_json(
            "/api/spots",
            &[
                ("section_id", section_id.to_string()),
                ("map_snapping", i64::from(map_snapping).to_string()),
            ],
        )
    }

    /// Sensor locations of a section, with the snapping mode selected
    /// explicitly.
    pub fn spots_with_snapping(&self, section_id: i64, mode: SnappingMode) -> Result<Spots> {
        self.get_json(
            "/api/spots",
            &[
                ("section_id", section_id.to_string()),
                ("snapping_mode", mode.as_wire().to_string()),
            ],
        )
    }

    /// Binned detection counts for every sensor of a section over a date
    /// range. The first trap-eye row of a series has NaN diff/new-count
    /// values since there is no prior photo to diff against.
    pub fn counts(&self, query: &CountsQuery) -> Result<Counts> {
        self.get_json("/api/counts", &query.to_params())
    }

    /// Available trap-eye photos of one sensor, newest first. Each entry is
    /// a `YYYYMMDD_HHMMSS` photo id to hand back to
    /// [`download_trapeye_photo`](Self::download_trapeye_photo).
    pub fn trapeye_photo_list(
        &self,
        section_id: i64,
        row_id: i64,
        post_id: i64,
        start_date: chrono::NaiveDate,
        end_date: chrono::NaiveDate,
    ) -> Result<Vec<String>> {
        let envelope: PhotoListEnvelope = self.get_json(
            "/api/trapeye_photo_list",
            &[
                ("section_id", section_id.to_string()),
                ("row_id", row_id.to_string()),
                ("post_id", post_id.to_string()),
                ("start_date", wire::format_date(start_date)),
                ("end_date", wire::format_date(end_date)),
            ],
        )?;
        Ok(envelope.photos)
    }

    /// Raw image bytes of one trap-eye photo. Never JSON.
    pub fn download_trapeye_photo(
        &self,
        section_id: i64,
        row_id: i64,
        post_id: i64,
        photo_id: &str,
    ) -> Result<Vec<u8>> {
        self.get_bytes(
            "/api/download_trapeye_photo",
            &[
                ("section_id", section_id.to_string()),
                ("row_id", row_id.to_string()),
                ("post_id", post_id.to_string()),
                ("datetime", photo_id.to_string()),
            ],
        )
    }

    /// Detection events of one pats-c sensor for one detection class within
    /// a time window. Accepts both the row/post and the legacy system_id
    /// sensor reference, see [`SensorRef`](crate::query::SensorRef).
    pub fn detection_features(
        &self,
        query: &DetectionFeaturesQuery,
    ) -> Result<Vec<DetectionFeature>> {
        let envelope: DataEnvelope<DetectionFeature> =
            self.get_json("/api/download_detection_features", &query.to_params())?;
        Ok(envelope.data)
    }

    /// Per-frame telemetry of a single detection.
    pub fn flight_track(
        &self,
        section_id: i64,
        detection_uid: i64,
    ) -> Result<Vec<FlightTrackPoint>> {
        let envelope: DataEnvelope<FlightTrackPoint> = self.get_json(
            "/api/download_c_flight_track",
            &[
                ("section_id", section_id.to_string()),
                ("detection_uid", detection_uid.to_string()),
            ],
        )?;
        info!("downloaded flight track of detection {}", detection_uid);
        Ok(envelope.data)
    }

    /// Raw video bytes of a single detection. The render happens on demand
    /// server-side and can take a while. `raw_stereo` goes out as the
    /// strings "0"/"1", unlike every other flag.
    pub fn download_video(
        &self,
        section_id: i64,
        detection_uid: i64,
        raw_stereo: bool,
    ) -> Result<Vec<u8>> {
        self.get_bytes(
            "/api/download_c_video",
            &[
                ("section_id", section_id.to_string()),
                ("detection_uid", detection_uid.to_string()),
                ("raw_stereo", if raw_stereo { "1" } else { "0" }.to_string()),
            ],
        )
    }

    fn get(
        &self,
        endpoint: &'static str,
        params: &[(&str, String)],
    ) -> Result<reqwest::blocking::Response> {
        debug!("GET {}{}", self.server, endpoint);
        let response = self
            .http
            .get(format!("{}{}", self.server.base_url(), endpoint))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .query(params)
            .send()
            .map_err(|source| PatsError::Transport { endpoint, source })?;
        check_status(endpoint, response)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let text = self
            .get(endpoint, params)?
            .text()
            .map_err(|source| PatsError::Transport { endpoint, source })?;
        // Counts and flight tracks may carry bare NaN/Infinity tokens.
        let body = wire::normalize_nonfinite(&text);
        serde_json::from_str(&body).map_err(|source| PatsError::Decode { endpoint, source })
    }

    fn get_bytes(&self, endpoint: &'static str, params: &[(&str, String)]) -> Result<Vec<u8>> {
        let bytes = self
            .get(endpoint, params)?
            .bytes()
            .map_err(|source| PatsError::Transport { endpoint, source })?;
        Ok(bytes.to_vec())
    }
}

fn check_status(
    endpoint: &'static str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().unwrap_or_default();
        error!("{} failed: {}, msg: {}", endpoint, status.as_u16(), message);
        return Err(PatsError::Api {
            endpoint,
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}
