//! Docker container management for ephemeral PostgreSQL instances
//!
//! Containers are started with a random host port, considered ready once the
//! postgres readiness line has been logged the configured number of times, and
//! removed either explicitly, on drop of the guard, or by [`cleanup_containers`]
//! / [`cleanup_all_containers`] at the end of a test or run.

use anyhow::{Context, Result, anyhow};
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, LogsOptionsBuilder,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::secret::{ContainerInspectResponse, HostConfig, PortBinding};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{ContainerSpec, DbConfig};
use crate::constants::{
    CONTAINER_BIND_ALL_IP, CONTAINER_HOST_IP, CONTAINER_NAME_PREFIX, DEFAULT_SSL_MODE,
    ENV_KEEP_CONTAINER_ON_FAILURE, POSTGRES_CONTAINER_PORT,
};

const DOCKER_CONNECT_RETRIES: u32 = 5;
const DOCKER_RETRY_DELAY: Duration = Duration::from_millis(200);
const FAILURE_LOG_TAIL: &str = "50";

/// Docker client wrapper for PostgreSQL test containers
pub struct DockerManager {
    docker: Docker,
    /// Hostname of a TCP daemon; `None` for a local socket
    remote_host: Option<String>,
}

/// Where a started container can be reached
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// RAII guard for a running PostgreSQL container.
///
/// Dropping the guard without calling [`PostgresContainer::terminate`] removes
/// the container, so a panicking test does not leak it.
pub struct PostgresContainer {
    info: ContainerInfo,
    database: String,
    user: String,
    password: String,
    armed: bool,
}

impl PostgresContainer {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Connection parameters for the database inside this container
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            host: self.info.host.clone(),
            port: self.info.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            ssl_mode: DEFAULT_SSL_MODE.to_string(),
        }
    }

    /// Stop and remove the container now instead of on drop
    pub async fn terminate(mut self, manager: &DockerManager) -> Result<()> {
        self.armed = false;
        manager.stop_container(&self.info.id, true).await
    }
}

impl Drop for PostgresContainer {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let container_id = self.info.id.clone();
        unregister_container(&container_id);

        // Drop can't await; use a dedicated runtime on its own thread so this works
        // whether or not we're inside a tokio runtime
        let cleanup = std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    debug!("Failed to create runtime for container cleanup: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                match DockerManager::new().await {
                    Ok(manager) => match manager.stop_container(&container_id, true).await {
                        Ok(()) => debug!("Removed container on drop: {}", container_id),
                        Err(e) if is_not_found(&e) => {}
                        Err(e) => warn!("Failed to remove container {}: {}", container_id, e),
                    },
                    Err(e) => debug!("Failed to reach Docker for cleanup: {}", e),
                }
            });
        });

        let _ = cleanup.join();
    }
}

fn is_not_found(error: &anyhow::Error) -> bool {
    let msg = error.to_string();
    msg.contains("404") || msg.contains("No such container")
}

/// Counts a log line across arbitrarily split log frames.
///
/// The last `needle.len() - 1` bytes of each frame are carried into the next,
/// which is too short to hold a full match, so nothing is counted twice.
struct OccurrenceCounter<'a> {
    needle: &'a str,
    carry: String,
    seen: usize,
}

impl<'a> OccurrenceCounter<'a> {
    fn new(needle: &'a str) -> Self {
        Self {
            needle,
            carry: String::new(),
            seen: 0,
        }
    }

    fn feed(&mut self, chunk: &str) -> usize {
        if self.needle.is_empty() {
            return self.seen;
        }

        let mut text = std::mem::take(&mut self.carry);
        text.push_str(chunk);
        self.seen += text.matches(self.needle).count();

        let mut tail_start = text.len().saturating_sub(self.needle.len() - 1);
        while !text.is_char_boundary(tail_start) {
            tail_start += 1;
        }
        self.carry = text.split_off(tail_start);
        self.seen
    }
}

/// Host part of a `tcp://`/`http(s)://` daemon address, e.g. `DOCKER_HOST`.
///
/// Unix sockets and unset values yield `None`: published ports are then on
/// the local loopback interface.
fn remote_daemon_host(docker_host: Option<&str>) -> Option<String> {
    let address = docker_host?.trim();
    let rest = ["tcp://", "http://", "https://"]
        .iter()
        .find_map(|scheme| address.strip_prefix(scheme))?;

    let authority = rest.split('/').next().unwrap_or_default();
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

impl DockerManager {
    /// Check whether a Docker daemon is reachable, with per-socket diagnostics
    pub async fn is_available_verbose() -> (bool, String) {
        match Self::probe().await {
            Ok((_, report)) => (true, report),
            Err(e) => (false, format!("Docker not available: {}", e)),
        }
    }

    /// Connect to the Docker daemon, retrying briefly while it comes up
    pub async fn new() -> Result<Self> {
        let mut last_report = String::new();

        for attempt in 0..=DOCKER_CONNECT_RETRIES {
            match Self::probe().await {
                Ok((docker, _)) => {
                    if attempt > 0 {
                        debug!("Connected to Docker after {} retries", attempt);
                    }
                    let remote_host =
                        remote_daemon_host(std::env::var("DOCKER_HOST").ok().as_deref());
                    if let Some(host) = &remote_host {
                        debug!("Docker daemon is remote; publishing ports on {}", host);
                    }
                    return Ok(Self {
                        docker,
                        remote_host,
                    });
                }
                Err(e) => {
                    last_report = e.to_string();
                    if attempt < DOCKER_CONNECT_RETRIES {
                        if attempt == 0 {
                            debug!("Docker not ready, retrying...");
                        }
                        tokio::time::sleep(DOCKER_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(anyhow!(
            "Failed to connect to Docker after {} attempts.\n\n{}\nMake sure the Docker daemon is running or set DOCKER_HOST.",
            DOCKER_CONNECT_RETRIES + 1,
            last_report
        ))
    }

    /// Try each socket candidate, then bollard's defaults; report what was tried
    async fn probe() -> Result<(Docker, String)> {
        let mut report = String::from("Docker socket detection:\n");

        for (description, socket_path) in Self::get_docker_socket_candidates() {
            report.push_str(&format!("  • {}: ", description));
            match Self::try_socket_path(&socket_path).await {
                Ok(docker) => {
                    report.push_str(&format!("connected ({})\n", socket_path));
                    return Ok((docker, report));
                }
                Err(e) => report.push_str(&format!("failed - {}\n", e)),
            }
        }

        report.push_str("  • bollard local defaults: ");
        match Docker::connect_with_local_defaults() {
            Ok(docker) => match docker.ping().await {
                Ok(_) => {
                    report.push_str("connected\n");
                    return Ok((docker, report));
                }
                Err(e) => report.push_str(&format!("failed to ping - {}\n", e)),
            },
            Err(e) => report.push_str(&format!("failed to connect - {}\n", e)),
        }

        Err(anyhow!(
            "Failed to connect to Docker daemon after trying all methods:\n{}",
            report
        ))
    }

    /// Docker socket candidates in priority order
    fn get_docker_socket_candidates() -> Vec<(String, String)> {
        let mut candidates = Vec::new();

        if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            candidates.push(("DOCKER_HOST environment variable".to_string(), docker_host));
        }

        #[cfg(target_os = "macos")]
        {
            if let Ok(home) = std::env::var("HOME") {
                candidates.push((
                    "macOS Docker Desktop".to_string(),
                    format!("unix://{}/.docker/run/docker.sock", home),
                ));
                candidates.push((
                    "Colima".to_string(),
                    format!("unix://{}/.colima/default/docker.sock", home),
                ));
                candidates.push((
                    "OrbStack".to_string(),
                    format!("unix://{}/.orbstack/run/docker.sock", home),
                ));
            }
        }

        candidates.push((
            "Standard Linux location".to_string(),
            "unix:///var/run/docker.sock".to_string(),
        ));

        candidates
    }

    async fn try_socket_path(socket_path: &str) -> Result<Docker> {
        let socket_file = socket_path
            .strip_prefix("unix://")
            .ok_or_else(|| anyhow!("Unsupported socket protocol: {}", socket_path))?;

        let docker = Docker::connect_with_socket(socket_file, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| anyhow!("Failed to connect to socket {}: {}", socket_path, e))?;

        docker
            .ping()
            .await
            .map_err(|e| anyhow!("Socket {} not responding: {}", socket_path, e))?;

        Ok(docker)
    }

    /// Start a PostgreSQL container and wait until it logs readiness.
    ///
    /// On readiness failure the container is force-removed unless
    /// `HARNESS_KEEP_CONTAINER_ON_FAILURE` is set, and the error carries the
    /// tail of the container log.
    pub async fn start_postgres(&self, spec: &ContainerSpec) -> Result<PostgresContainer> {
        let container_name = spec
            .container_name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", CONTAINER_NAME_PREFIX, uuid::Uuid::new_v4().simple()));

        info!("🚀 Starting PostgreSQL container {} ({})", container_name, spec.image);

        let image_start = Instant::now();
        self.ensure_image_available(&spec.image).await?;
        debug!("Image available after {:?}", image_start.elapsed());

        // Let Docker pick a free host port; loopback only unless the daemon is remote
        let bind_ip = match self.remote_host {
            Some(_) => CONTAINER_BIND_ALL_IP,
            None => CONTAINER_HOST_IP,
        };
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            POSTGRES_CONTAINER_PORT.to_string(),
            Some(vec![PortBinding {
                host_ip: Some(bind_ip.to_string()),
                host_port: None,
            }]),
        );

        let container_config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(spec.environment()),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: Some(container_name.clone()),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| anyhow!("Failed to create container: {}", e))?;

        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await
        {
            let _ = self.remove_container(&container.id, true).await;
            return Err(anyhow!("Failed to start container: {}", e));
        }

        register_container(container.id.clone());

        let readiness_start = Instant::now();
        let ready = match self
            .wait_for_log_message(
                &container.id,
                &spec.readiness_message,
                spec.readiness_occurrences,
                spec.startup_timeout,
            )
            .await
        {
            Ok(()) => self.inspect_host_port(&container.id).await,
            Err(e) => Err(e),
        };

        let host_port = match ready {
            Ok(port) => port,
            Err(readiness_err) => {
                return Err(self
                    .handle_startup_failure(&container.id, &container_name, readiness_err)
                    .await);
            }
        };
        debug!("PostgreSQL ready after {:?}", readiness_start.elapsed());

        let info = ContainerInfo {
            id: container.id,
            name: container_name,
            host: self.published_host().to_string(),
            port: host_port,
        };

        info!(
            "PostgreSQL container ready: {} on {}:{}",
            info.name, info.host, info.port
        );

        Ok(PostgresContainer {
            info,
            database: spec.database.clone(),
            user: spec.user.clone(),
            password: spec.password.clone(),
            armed: true,
        })
    }

    /// Host on which published container ports are reachable from here
    pub fn published_host(&self) -> &str {
        self.remote_host.as_deref().unwrap_or(CONTAINER_HOST_IP)
    }

    async fn handle_startup_failure(
        &self,
        container_id: &str,
        container_name: &str,
        readiness_err: anyhow::Error,
    ) -> anyhow::Error {
        let logs = self.fetch_container_logs(container_id).await;
        let keep_on_failure =
            std::env::var(ENV_KEEP_CONTAINER_ON_FAILURE).is_ok_and(|v| !v.is_empty());

        if keep_on_failure {
            unregister_container(container_id);
            anyhow!(
                "{readiness_err:#}\n\n\
                 Container logs (last {FAILURE_LOG_TAIL} lines):\n{logs}\n\n\
                 The container has been kept alive for debugging:\n  \
                 docker logs {container_name}\n  \
                 docker rm -f {container_name}"
            )
        } else {
            let _ = self.remove_container(container_id, true).await;
            unregister_container(container_id);
            anyhow!(
                "{readiness_err:#}\n\n\
                 Container logs (last {FAILURE_LOG_TAIL} lines):\n{logs}\n\n\
                 Tip: re-run with {ENV_KEEP_CONTAINER_ON_FAILURE}=1 to keep the container for debugging."
            )
        }
    }

    /// Follow the container log until `message` has appeared `occurrences` times.
    ///
    /// Fails if the deadline passes or the log stream ends first (the container
    /// exited).
    async fn wait_for_log_message(
        &self,
        container_id: &str,
        message: &str,
        occurrences: usize,
        timeout: Duration,
    ) -> Result<()> {
        let options = LogsOptionsBuilder::new()
            .follow(true)
            .stdout(true)
            .stderr(true)
            .build();

        let mut stream = Box::pin(self.docker.logs(container_id, Some(options)));
        let mut counter = OccurrenceCounter::new(message);

        let watch = async {
            while let Some(chunk) = stream.next().await {
                let output: LogOutput = match chunk {
                    Ok(output) => output,
                    Err(e) => return Err(anyhow!("Failed to read container logs: {}", e)),
                };
                if counter.feed(&output.to_string()) >= occurrences {
                    return Ok(());
                }
            }
            Err::<(), anyhow::Error>(anyhow!(
                "Container log ended after {} of {} readiness messages; the container probably exited",
                counter.seen,
                occurrences
            ))
        };

        match tokio::time::timeout(timeout, watch).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "PostgreSQL did not log '{}' {} times within {:?}",
                message,
                occurrences,
                timeout
            )),
        }
    }

    async fn inspect_host_port(&self, container_id: &str) -> Result<u16> {
        let inspect = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| anyhow!("Failed to inspect container: {}", e))?;

        extract_host_port(&inspect).context("Failed to read mapped PostgreSQL port")
    }

    /// Stop and optionally remove a container.
    ///
    /// If stopping fails because the container already exited, removal is still
    /// attempted with force.
    pub async fn stop_container(&self, container_id: &str, remove: bool) -> Result<()> {
        let stop_result = self
            .docker
            .stop_container(container_id, None::<StopContainerOptions>)
            .await;

        let outcome = match stop_result {
            Ok(()) if remove => self.remove_container(container_id, false).await,
            Ok(()) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                if !msg.contains("404") && !msg.contains("No such container") && remove {
                    self.remove_container(container_id, true).await
                } else {
                    Err(anyhow!("Failed to stop container: {}", e))
                }
            }
        };

        unregister_container(container_id);
        outcome
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        let remove_options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.docker
            .remove_container(container_id, Some(remove_options))
            .await
            .map_err(|e| anyhow!("Failed to remove container: {}", e))
    }

    /// Last lines of container output, or a placeholder if they can't be read
    async fn fetch_container_logs(&self, container_id: &str) -> String {
        let options = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .tail(FAILURE_LOG_TAIL)
            .build();

        let log_stream = self.docker.logs(container_id, Some(options));

        match tokio::time::timeout(
            Duration::from_secs(3),
            log_stream.collect::<Vec<Result<LogOutput, _>>>(),
        )
        .await
        {
            Ok(results) => {
                let text: String = results
                    .into_iter()
                    .filter_map(|r| r.ok())
                    .map(|output| output.to_string())
                    .collect();
                if text.is_empty() {
                    "(no logs available)".to_string()
                } else {
                    text
                }
            }
            Err(_) => "(timed out fetching container logs)".to_string(),
        }
    }

    async fn ensure_image_available(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!("Pulling image {}", image);
        let options = CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull_stream.next().await {
            result.map_err(|e| anyhow!("Failed to pull image {}: {}", image, e))?;
        }

        debug!("Pulled image {}", image);
        Ok(())
    }
}

/// Read the host port Docker bound to the container's 5432/tcp
fn extract_host_port(inspect: &ContainerInspectResponse) -> Result<u16> {
    let port_bindings = inspect
        .network_settings
        .as_ref()
        .ok_or_else(|| anyhow!("Container has no network settings"))?
        .ports
        .as_ref()
        .ok_or_else(|| anyhow!("Container has no port mappings"))?
        .get(POSTGRES_CONTAINER_PORT)
        .ok_or_else(|| anyhow!("Container has no {} mapping", POSTGRES_CONTAINER_PORT))?
        .as_ref()
        .ok_or_else(|| anyhow!("Port {} is not bound", POSTGRES_CONTAINER_PORT))?;

    let host_port = port_bindings
        .first()
        .and_then(|binding| binding.host_port.as_ref())
        .ok_or_else(|| anyhow!("Host port not set for {}", POSTGRES_CONTAINER_PORT))?;

    host_port
        .parse::<u16>()
        .map_err(|e| anyhow!("Invalid host port '{}': {}", host_port, e))
}

use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Containers started by this process that have not been removed yet
static CONTAINER_REGISTRY: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

tokio::task_local! {
    /// Ids started inside the current [`track_started_containers`] scope
    static STARTED_IN_SCOPE: Arc<Mutex<Vec<String>>>;
}

fn registry() -> std::sync::MutexGuard<'static, Vec<String>> {
    CONTAINER_REGISTRY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn register_container(container_id: String) {
    let _ = STARTED_IN_SCOPE.try_with(|started| {
        started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(container_id.clone());
    });
    registry().push(container_id);
}

pub fn unregister_container(container_id: &str) {
    registry().retain(|id| id != container_id);
}

pub fn registered_containers() -> Vec<String> {
    registry().clone()
}

/// Run `future` and return the ids of every container it started.
///
/// Only containers started on the same task are seen, so concurrent tests
/// each get their own list.
pub async fn track_started_containers<F>(future: F) -> (F::Output, Vec<String>)
where
    F: Future,
{
    let started = Arc::new(Mutex::new(Vec::new()));
    let output = STARTED_IN_SCOPE.scope(started.clone(), future).await;
    let ids = started
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    (output, ids)
}

/// Remove those of `container_ids` that are still registered.
///
/// Ids stay in the registry when Docker cannot be reached.
pub async fn cleanup_containers(container_ids: &[String]) -> Result<()> {
    let pending: Vec<String> = {
        let registered = registry();
        container_ids
            .iter()
            .filter(|id| registered.contains(id))
            .cloned()
            .collect()
    };
    if pending.is_empty() {
        return Ok(());
    }

    let manager = DockerManager::new().await?;
    remove_all(&manager, &pending).await;
    Ok(())
}

/// Remove every container still in the registry
pub async fn cleanup_all_containers() -> Result<()> {
    let container_ids = registered_containers();
    if container_ids.is_empty() {
        return Ok(());
    }

    let manager = DockerManager::new().await?;
    remove_all(&manager, &container_ids).await;
    Ok(())
}

async fn remove_all(manager: &DockerManager, container_ids: &[String]) {
    info!("Cleaning up {} registered container(s)", container_ids.len());

    let cleanup = futures_util::future::join_all(container_ids.iter().map(|id| async move {
        match manager.stop_container(id, true).await {
            Ok(()) => info!("Cleaned up container: {}", id),
            Err(e) if is_not_found(&e) => debug!("Container {} already removed", id),
            Err(e) => warn!("Failed to clean up container {}: {}", id, e),
        }
    }));

    const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);
    if tokio::time::timeout(CLEANUP_TIMEOUT, cleanup).await.is_err() {
        warn!("Container cleanup timed out after {:?}", CLEANUP_TIMEOUT);
    }
}
