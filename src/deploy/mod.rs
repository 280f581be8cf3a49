//!
//! Deploying workloads
//!
//! A [`DeployRequest`] is built from a parsed [`Specs`] document and the
//! [`Overrides`] given on the command line, submitted once, and the
//! per-instance results are drained with [`consumer::drain`].
use crate::specs::Specs;
use crate::{Error, Result};
use futures_util::Stream;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;

pub mod consumer;
pub mod port;
pub mod stream;

pub use port::PortBinding;
pub use stream::OutcomeMessage;

/// Values supplied by the caller rather than the spec document
#[derive(Clone, Debug, PartialEq)]
pub struct Overrides {
    /// Pod to deploy into, required
    pub pod: String,
    /// Node to pin the instances to, empty lets the core schedule
    pub node: String,
    /// Entrypoint of the spec to run, required
    pub entrypoint: String,
    /// Image reference, required
    pub image: String,
    /// Network name, see [`crate::network::resolve`]
    pub network: String,
    /// CPU quota in fractional cores
    pub cpu_quota: f64,
    /// Memory limit in bytes
    pub memory: i64,
    /// `KEY=VALUE` pairs
    pub env: Vec<String>,
    /// Number of instances
    pub count: u32,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            pod: String::new(),
            node: String::new(),
            entrypoint: String::new(),
            image: String::new(),
            network: String::new(),
            cpu_quota: 1.0,
            memory: 512 * 1024 * 1024,
            env: Vec::new(),
            count: 1,
        }
    }
}

/// Health check sent to the core. All defaults when the entrypoint has none.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthCheckOptions {
    pub ports: Vec<PortBinding>,
    pub url: String,
    pub code: i32,
}

/// Hook sent to the core. All defaults when the entrypoint has none.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HookOptions {
    pub after_start: Vec<String>,
    pub before_stop: Vec<String>,
    pub force: bool,
}

/// The selected entrypoint as sent to the core
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EntrypointOptions {
    pub name: String,
    pub command: Vec<String>,
    pub privileged: bool,
    pub dir: String,
    pub log_config: String,
    pub publish: Vec<PortBinding>,
    pub healthcheck: HealthCheckOptions,
    pub hook: HookOptions,
    pub restart_policy: String,
    pub extra_hosts: Vec<String>,
}

/// A complete deploy request
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeployRequest {
    /// Application name
    pub name: String,
    pub entrypoint: EntrypointOptions,
    #[serde(rename = "podname")]
    pub pod: String,
    #[serde(rename = "nodename")]
    pub node: String,
    pub image: String,
    pub cpu_quota: f64,
    pub memory: i64,
    pub count: u32,
    pub env: Vec<String>,
    /// Network name to IP, IPs are assigned by the core
    pub networks: BTreeMap<String, String>,
    #[serde(rename = "networkmode")]
    pub network_mode: String,
    pub volumes: BTreeMap<String, String>,
    pub meta: BTreeMap<String, String>,
    pub dns: Vec<String>,
}

impl DeployRequest {
    /// Build a request for `overrides.entrypoint` of `specs`.
    ///
    /// Pod, entrypoint and image must be set. Numeric overrides are passed on
    /// as given, the core validates them.
    pub fn build(specs: &Specs, overrides: &Overrides) -> Result<Self> {
        let required = [
            ("pod", &overrides.pod),
            ("entrypoint", &overrides.entrypoint),
            ("image", &overrides.image),
        ];
        if let Some(&(field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(Error::MissingRequiredField(field));
        }

        let entry = specs
            .entrypoints
            .get(&overrides.entrypoint)
            .ok_or_else(|| Error::EntrypointNotFound(overrides.entrypoint.clone()))?;

        let healthcheck = match &entry.healthcheck {
            Some(healthcheck) => HealthCheckOptions {
                ports: port::decode_ports(&healthcheck.ports)?,
                url: healthcheck.url.clone(),
                code: healthcheck.code,
            },
            None => HealthCheckOptions::default(),
        };

        let hook = entry
            .hook
            .as_ref()
            .map(|hook| HookOptions {
                after_start: hook.after_start.clone(),
                before_stop: hook.before_stop.clone(),
                force: hook.force,
            })
            .unwrap_or_default();

        let network = crate::network::resolve(&overrides.network);

        let request = Self {
            name: specs.appname.clone(),
            entrypoint: EntrypointOptions {
                name: overrides.entrypoint.clone(),
                command: entry.command.clone(),
                privileged: entry.privileged,
                dir: entry.dir.clone(),
                log_config: entry.log_config.clone(),
                publish: port::decode_ports(&entry.publish)?,
                healthcheck,
                hook,
                restart_policy: entry.restart_policy.clone(),
                extra_hosts: entry.extra_hosts.clone(),
            },
            pod: overrides.pod.clone(),
            node: overrides.node.clone(),
            image: overrides.image.clone(),
            cpu_quota: overrides.cpu_quota,
            memory: overrides.memory,
            count: overrides.count,
            env: overrides.env.clone(),
            networks: network.networks,
            network_mode: network.mode,
            volumes: specs.volumes.clone(),
            meta: specs.meta.clone(),
            dns: specs.dns.clone(),
        };
        tracing::debug!(
            "built deploy request for {}/{} in pod {}",
            request.name,
            request.entrypoint.name,
            request.pod
        );
        Ok(request)
    }
}

/// Something that can submit a [`DeployRequest`] and stream back the outcomes
pub trait Deployer {
    /// Outcome stream, ends cleanly or with a transport error
    type Stream: Stream<Item = Result<OutcomeMessage>> + Unpin;

    /// Submit the request. An error here means nothing was scheduled.
    fn create_workload(&self, request: &DeployRequest)
        -> impl Future<Output = Result<Self::Stream>>;
}

impl Deployer for crate::Client {
    type Stream = stream::WorkloadStream;

    async fn create_workload(&self, request: &DeployRequest) -> Result<Self::Stream> {
        stream::WorkloadStream::open(self, request).await
    }
}

/// Submit `request` and report every outcome to `reporter` until the stream ends.
///
/// Returns the tally of succeeded and failed instances when the stream ends
/// cleanly. Instances failing individually don't make this fail, a transport
/// error or `cancel` completing does.
pub async fn deploy<D, R, C>(
    deployer: &D,
    request: &DeployRequest,
    reporter: &mut R,
    cancel: C,
) -> Result<consumer::Summary>
where
    D: Deployer,
    R: consumer::Reporter + ?Sized,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);

    let stream = tokio::select! {
        biased;
        () = &mut cancel => return Err(Error::Cancelled),
        stream = deployer.create_workload(request) => stream?,
    };

    consumer::drain(stream, reporter, cancel).await
}

#[cfg(test)]
mod test {
    use super::consumer::{Reporter, Summary};
    use super::{DeployRequest, Deployer, HealthCheckOptions, HookOptions, OutcomeMessage, Overrides};
    use crate::specs::{SpecFormat, Specs};
    use crate::{Error, Result};
    use futures_util::stream;

    const APP: &str = r#"
appname: app
entrypoints:
  web:
    cmd: ["/bin/app"]
  api:
    cmd: /bin/api --listen 0.0.0.0:8080
    privileged: true
    dir: /srv
    log_config: journald
    restart: always
    publish: ["8080", "53/udp"]
    hosts: ["db:10.0.0.2"]
    healthcheck:
      ports: ["8080"]
      url: http://127.0.0.1:8080/healthz
      code: 200
    hook:
      after_start: ["/bin/api", "warmup"]
      force: true
  broken:
    cmd: /bin/broken
    publish: ["80/tcp", "http"]
  broken-check:
    cmd: /bin/broken
    healthcheck:
      ports: ["eighty"]
volumes:
  data: /data:/var/lib/app
meta:
  team: infra
dns: ["10.0.0.53"]
"#;

    fn specs() -> Specs {
        Specs::parse(APP.as_bytes(), SpecFormat::Yaml).unwrap()
    }

    fn overrides(entrypoint: &str) -> Overrides {
        Overrides {
            pod: "prod".into(),
            entrypoint: entrypoint.into(),
            image: "repo/app:1.0".into(),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_entrypoint() {
        let overrides = Overrides {
            network: "mynet".into(),
            count: 2,
            ..overrides("web")
        };
        let request = DeployRequest::build(&specs(), &overrides).unwrap();

        assert_eq!(request.name, "app");
        assert_eq!(request.entrypoint.name, "web");
        assert_eq!(request.entrypoint.command, vec!["/bin/app"]);
        assert_eq!(request.network_mode, "mynet");
        assert_eq!(request.networks.len(), 1);
        assert_eq!(request.networks["mynet"], "");
        assert_eq!(request.count, 2);
        assert_eq!(request.entrypoint.healthcheck, HealthCheckOptions::default());
        assert_eq!(request.entrypoint.hook, HookOptions::default());
        assert!(request.entrypoint.publish.is_empty());
    }

    #[test]
    fn full_entrypoint() {
        let overrides = Overrides {
            node: "node-1".into(),
            network: "host".into(),
            cpu_quota: 0.5,
            memory: 1 << 30,
            env: vec!["A=1".into(), "B=2".into()],
            count: 3,
            ..overrides("api")
        };
        let request = DeployRequest::build(&specs(), &overrides).unwrap();
        let entry = &request.entrypoint;

        assert_eq!(entry.command, vec!["/bin/api", "--listen", "0.0.0.0:8080"]);
        assert!(entry.privileged);
        assert_eq!(entry.dir, "/srv");
        assert_eq!(entry.log_config, "journald");
        assert_eq!(entry.restart_policy, "always");
        assert_eq!(entry.extra_hosts, vec!["db:10.0.0.2"]);
        assert_eq!(
            entry.publish.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["8080/tcp", "53/udp"]
        );
        assert_eq!(entry.healthcheck.ports[0].port, 8080);
        assert_eq!(entry.healthcheck.url, "http://127.0.0.1:8080/healthz");
        assert_eq!(entry.healthcheck.code, 200);
        assert_eq!(entry.hook.after_start, vec!["/bin/api", "warmup"]);
        assert!(entry.hook.before_stop.is_empty());
        assert!(entry.hook.force);

        assert_eq!(request.pod, "prod");
        assert_eq!(request.node, "node-1");
        assert_eq!(request.image, "repo/app:1.0");
        assert!((request.cpu_quota - 0.5).abs() < f64::EPSILON);
        assert_eq!(request.memory, 1 << 30);
        assert_eq!(request.env, vec!["A=1", "B=2"]);
        assert_eq!(request.count, 3);
        assert!(request.networks.is_empty());
        assert_eq!(request.network_mode, "host");
        assert_eq!(request.volumes["data"], "/data:/var/lib/app");
        assert_eq!(request.meta["team"], "infra");
        assert_eq!(request.dns, vec!["10.0.0.53"]);
    }

    #[test]
    fn missing_required() {
        let specs = specs();
        for (field, overrides) in [
            ("pod", Overrides { pod: String::new(), ..overrides("web") }),
            ("entrypoint", overrides("")),
            ("image", Overrides { image: String::new(), ..overrides("web") }),
        ] {
            let err = DeployRequest::build(&specs, &overrides).unwrap_err();
            assert!(matches!(err, Error::MissingRequiredField(f) if f == field), "{err}");
        }
    }

    #[test]
    fn entrypoint_not_found() {
        let specs = specs();
        for overrides in [
            overrides("db"),
            Overrides { network: "mynet".into(), count: 0, cpu_quota: -1.0, ..overrides("WEB") },
        ] {
            let err = DeployRequest::build(&specs, &overrides).unwrap_err();
            assert!(matches!(err, Error::EntrypointNotFound(ref e) if *e == overrides.entrypoint));
        }
    }

    #[test]
    fn every_declared_entrypoint_builds() {
        let specs = specs();
        for name in ["web", "api"] {
            assert!(DeployRequest::build(&specs, &overrides(name)).is_ok());
        }
    }

    #[test]
    fn invalid_ports() {
        let specs = specs();
        let err = DeployRequest::build(&specs, &overrides("broken")).unwrap_err();
        assert!(matches!(err, Error::InvalidPortSpec(ref p) if p == "http"));

        let err = DeployRequest::build(&specs, &overrides("broken-check")).unwrap_err();
        assert!(matches!(err, Error::InvalidPortSpec(ref p) if p == "eighty"));
    }

    #[test]
    fn numbers_pass_through() {
        let overrides = Overrides {
            cpu_quota: 0.0,
            memory: -1,
            count: 0,
            ..overrides("web")
        };
        let request = DeployRequest::build(&specs(), &overrides).unwrap();
        assert_eq!(request.count, 0);
        assert_eq!(request.memory, -1);
    }

    #[test]
    fn wire_format() {
        let request = DeployRequest::build(
            &specs(),
            &Overrides { network: "mynet".into(), ..overrides("web") },
        )
        .unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["podname"], "prod");
        assert_eq!(json["nodename"], "");
        assert_eq!(json["networkmode"], "mynet");
        assert_eq!(json["networks"]["mynet"], "");
        assert_eq!(json["cpu-quota"], 1.0_f64);
        assert_eq!(json["entrypoint"]["restart-policy"], "");
        // absent health check and hook are present with default values
        assert_eq!(
            json["entrypoint"]["healthcheck"],
            serde_json::json!({"ports": [], "url": "", "code": 0})
        );
        assert_eq!(
            json["entrypoint"]["hook"],
            serde_json::json!({"after-start": [], "before-stop": [], "force": false})
        );
    }

    struct FakeCore {
        refuse: bool,
        outcomes: Vec<OutcomeMessage>,
    }

    impl Deployer for FakeCore {
        type Stream = stream::Iter<std::vec::IntoIter<Result<OutcomeMessage>>>;

        async fn create_workload(&self, request: &DeployRequest) -> Result<Self::Stream> {
            assert_eq!(request.pod, "prod");
            if self.refuse {
                return Err(Error::Rpc(Some("refused".into())));
            }
            Ok(stream::iter(
                self.outcomes.iter().cloned().map(Ok).collect::<Vec<_>>(),
            ))
        }
    }

    #[derive(Default)]
    struct Log {
        outcomes: Vec<OutcomeMessage>,
        done: Option<Summary>,
        failed: bool,
    }

    impl Reporter for Log {
        fn outcome(&mut self, outcome: &OutcomeMessage) {
            self.outcomes.push(outcome.clone());
        }

        fn done(&mut self, summary: &Summary) {
            self.done = Some(*summary);
        }

        fn failed(&mut self, _error: &Error, _summary: &Summary) {
            self.failed = true;
        }
    }

    #[tokio::test]
    async fn deploy_reports_partial_outcome() {
        let core = FakeCore {
            refuse: false,
            outcomes: vec![
                OutcomeMessage {
                    id: "1".into(),
                    success: true,
                    publish: [("mynet".to_string(), "10.0.0.5:8080".to_string())].into(),
                    ..Default::default()
                },
                OutcomeMessage {
                    id: "2".into(),
                    error: "no resource".into(),
                    ..Default::default()
                },
            ],
        };
        let request = DeployRequest::build(
            &specs(),
            &Overrides { network: "mynet".into(), count: 2, ..overrides("web") },
        )
        .unwrap();
        let mut log = Log::default();

        let summary = super::deploy(&core, &request, &mut log, std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary, Summary { succeeded: 1, failed: 1 });
        assert_eq!(log.done, Some(summary));
        assert!(!log.failed);
        assert_eq!(log.outcomes[0].publish["mynet"], "10.0.0.5:8080");
        assert_eq!(log.outcomes[1].error, "no resource");
    }

    #[tokio::test]
    async fn deploy_refused() {
        let core = FakeCore {
            refuse: true,
            outcomes: vec![],
        };
        let request = DeployRequest::build(&specs(), &overrides("web")).unwrap();
        let mut log = Log::default();

        let err = super::deploy(&core, &request, &mut log, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Rpc(_)));
        assert!(log.outcomes.is_empty());
        assert!(log.done.is_none());
    }

    #[tokio::test]
    async fn deploy_cancelled_up_front() {
        let core = FakeCore {
            refuse: false,
            outcomes: vec![OutcomeMessage::default()],
        };
        let request = DeployRequest::build(&specs(), &overrides("web")).unwrap();
        let mut log = Log::default();

        let err = super::deploy(&core, &request, &mut log, std::future::ready(()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(log.outcomes.is_empty());
    }
}
