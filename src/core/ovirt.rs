use async_trait::async_trait;
use reqwest::{Certificate, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::errors::{PlatformError, PlatformResult};
use super::platform::Platform;
use super::vm::{
    BootstrapConfig, DeviceAddress, IpVersion, MachineHandle, MachineState, NetworkDevice, VmInfo,
};

/// Everything needed to open a session against an oVirt engine.
#[derive(Debug, Clone)]
pub struct OvirtConnectOptions {
    /// API entry point, e.g. `https://engine.example.com/ovirt-engine/api`.
    pub url: String,
    pub user: String,
    pub password: String,
    pub ca_file: PathBuf,
    pub request_timeout: Duration,
}

/// oVirt engine client speaking the v4 REST API in JSON.
pub struct OvirtClient {
    http: Client,
    api_url: String,
    engine_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct SsoResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmCollection {
    #[serde(default)]
    vm: Vec<VmResource>,
}

#[derive(Debug, Deserialize)]
struct VmResource {
    id: String,
    name: String,
    status: Option<String>,
    fqdn: Option<String>,
}

impl VmResource {
    fn handle(&self) -> MachineHandle {
        MachineHandle::new(&self.id, &self.name)
    }
}

#[derive(Debug, Deserialize)]
struct ReportedDeviceCollection {
    #[serde(default)]
    reported_device: Vec<ReportedDeviceResource>,
}

#[derive(Debug, Deserialize)]
struct ReportedDeviceResource {
    name: String,
    ips: Option<IpCollection>,
}

#[derive(Debug, Deserialize)]
struct IpCollection {
    #[serde(default)]
    ip: Vec<IpResource>,
}

#[derive(Debug, Deserialize)]
struct IpResource {
    address: String,
    version: Option<String>,
}

impl From<ReportedDeviceResource> for NetworkDevice {
    fn from(dev: ReportedDeviceResource) -> Self {
        let addresses = dev
            .ips
            .map(|ips| ips.ip)
            .unwrap_or_default()
            .into_iter()
            .map(|ip| DeviceAddress {
                version: match ip.version.as_deref() {
                    Some("v6") => IpVersion::V6,
                    _ => IpVersion::V4,
                },
                address: ip.address,
            })
            .collect();
        NetworkDevice {
            name: dev.name,
            addresses,
        }
    }
}

/// `.../ovirt-engine/api` -> `.../ovirt-engine`
fn engine_url(api_url: &str) -> PlatformResult<String> {
    api_url
        .trim_end_matches('/')
        .strip_suffix("/api")
        .map(str::to_string)
        .ok_or_else(|| {
            PlatformError::ConfigError(format!(
                "engine url '{}' does not end with /api",
                api_url
            ))
        })
}

impl OvirtClient {
    /// Opens an SSO session. The returned client owns the token until
    /// [`Platform::close`] is called.
    pub async fn connect(options: &OvirtConnectOptions) -> PlatformResult<Self> {
        let engine_url = engine_url(&options.url)?;
        let pem = tokio::fs::read(&options.ca_file).await?;
        let ca = Certificate::from_pem(&pem)
            .map_err(|e| PlatformError::ConfigError(format!("invalid CA file: {}", e)))?;

        let http = Client::builder()
            .add_root_certificate(ca)
            .timeout(options.request_timeout)
            .build()?;

        info!(url = %options.url, user = %options.user, "Connecting to oVirt engine");
        let response: SsoResponse = http
            .post(format!("{}/sso/oauth/token", engine_url))
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "password"),
                ("scope", "ovirt-app-api"),
                ("username", options.user.as_str()),
                ("password", options.password.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        let token = match response {
            SsoResponse {
                access_token: Some(token),
                ..
            } => token,
            SsoResponse {
                error, error_description, ..
            } => {
                return Err(PlatformError::AuthError(
                    error_description
                        .or(error)
                        .unwrap_or_else(|| "no access token in SSO response".to_string()),
                ))
            }
        };

        info!("Successfully connected to oVirt engine");
        Ok(Self {
            http,
            api_url: options.url.trim_end_matches('/').to_string(),
            engine_url,
            token,
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> PlatformResult<Response> {
        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .header("Version", "4")
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(%method, path, "oVirt request");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::ApiError {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> PlatformResult<T> {
        Ok(self.send(Method::GET, path, query, None).await?.json().await?)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> PlatformResult<T> {
        Ok(self.send(Method::POST, path, &[], Some(body)).await?.json().await?)
    }
}

#[async_trait]
impl Platform for OvirtClient {
    async fn find_by_name(&self, name: &str) -> PlatformResult<Vec<MachineHandle>> {
        let search = format!("name={}", name);
        let vms: VmCollection = self.get("/vms", &[("search", search.as_str())]).await?;
        // The search language matches case-insensitively, keep exact hits only.
        Ok(vms
            .vm
            .iter()
            .filter(|vm| vm.name == name)
            .map(VmResource::handle)
            .collect())
    }

    async fn create_vm(
        &self,
        name: &str,
        cluster: &str,
        template: &str,
    ) -> PlatformResult<MachineHandle> {
        let body = json!({
            "name": name,
            "cluster": { "name": cluster },
            "template": { "name": template },
        });
        let vm: VmResource = self.post("/vms", body).await?;
        Ok(vm.handle())
    }

    async fn start_vm(
        &self,
        vm: &MachineHandle,
        bootstrap: &BootstrapConfig,
    ) -> PlatformResult<()> {
        let body = json!({
            "use_cloud_init": true,
            "vm": {
                "initialization": {
                    "authorized_ssh_keys": bootstrap.authorized_ssh_keys,
                },
            },
        });
        let _action: serde_json::Value =
            self.post(&format!("/vms/{}/start", vm.id), body).await?;
        Ok(())
    }

    async fn vm_info(&self, vm: &MachineHandle) -> PlatformResult<VmInfo> {
        let resource: VmResource = self.get(&format!("/vms/{}", vm.id), &[]).await?;
        let state = resource
            .status
            .as_deref()
            .map(MachineState::from_platform_status)
            .unwrap_or(MachineState::Unknown);
        Ok(VmInfo {
            handle: resource.handle(),
            state,
            fqdn: resource.fqdn.filter(|f| !f.is_empty()),
        })
    }

    async fn reported_devices(&self, vm: &MachineHandle) -> PlatformResult<Vec<NetworkDevice>> {
        let devices: ReportedDeviceCollection = self
            .get(&format!("/vms/{}/reporteddevices", vm.id), &[])
            .await?;
        Ok(devices
            .reported_device
            .into_iter()
            .map(NetworkDevice::from)
            .collect())
    }

    async fn list_vms(&self) -> PlatformResult<Vec<MachineHandle>> {
        let vms: VmCollection = self.get("/vms", &[]).await?;
        Ok(vms.vm.iter().map(VmResource::handle).collect())
    }

    async fn close(&self) -> PlatformResult<()> {
        let response = self
            .http
            .get(format!("{}/services/sso-logout", self.engine_url))
            .query(&[("token", self.token.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "SSO logout was not acknowledged");
        } else {
            info!("oVirt session closed");
        }
        Ok(())
    }
}
