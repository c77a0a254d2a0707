//! Role detection: is this process the coordinator or a forked worker?

use std::net::SocketAddr;

use crate::runtime::{CHANNEL_ENV, WORKER_ID_ENV};
use crate::types::{Error, Result, WorkerId};

/// Role of the current process, computed once per `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Worker,
}

/// Answers "which role is this process?".
#[cfg_attr(test, mockall::automock)]
pub trait RoleSource: Send + Sync {
    fn role(&self) -> Role;
}

/// Reads the role from the environment set up by the process runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvRoleSource;

impl RoleSource for EnvRoleSource {
    fn role(&self) -> Role {
        if std::env::var_os(WORKER_ID_ENV).is_some() {
            Role::Worker
        } else {
            Role::Coordinator
        }
    }
}

/// Always reports the same role.
#[derive(Debug, Clone, Copy)]
pub struct FixedRole(pub Role);

impl RoleSource for FixedRole {
    fn role(&self) -> Role {
        self.0
    }
}

/// What a worker learns about itself from its environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerEnv {
    pub worker: Option<WorkerId>,
    pub channel: Option<SocketAddr>,
}

impl WorkerEnv {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let worker = lookup(WORKER_ID_ENV)
            .map(|raw| {
                raw.parse::<WorkerId>()
                    .map_err(|e| Error::configuration(format!("{}={}: {}", WORKER_ID_ENV, raw, e)))
            })
            .transpose()?;
        let channel = lookup(CHANNEL_ENV)
            .map(|raw| {
                raw.parse::<SocketAddr>()
                    .map_err(|e| Error::configuration(format!("{}={}: {}", CHANNEL_ENV, raw, e)))
            })
            .transpose()?;
        Ok(Self { worker, channel })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_env_parsed() {
        let env = WorkerEnv::from_lookup(|key| match key {
            "PREFORK_WORKER_ID" => Some("3".to_string()),
            "PREFORK_CHANNEL" => Some("127.0.0.1:4000".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(env.worker, Some(WorkerId::new(3).unwrap()));
        assert_eq!(env.channel, Some("127.0.0.1:4000".parse().unwrap()));
    }

    #[test]
    fn test_worker_env_absent() {
        assert_eq!(WorkerEnv::from_lookup(|_| None).unwrap(), WorkerEnv::default());
    }

    #[test]
    fn test_worker_env_garbage_rejected() {
        let err = WorkerEnv::from_lookup(|key| {
            (key == "PREFORK_CHANNEL").then(|| "not-an-addr".to_string())
        })
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_fixed_role() {
        assert_eq!(FixedRole(Role::Worker).role(), Role::Worker);
    }
}
