//! `doctor` command: can a run start on this host?

use crate::config::{ConfigOverrides, ProvisionConfig};
use crate::runtime::{DockerDiagnosis, diagnose_docker};

/// One diagnostic line.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Check {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

pub async fn run_doctor_command(json: bool) -> anyhow::Result<()> {
    let checks = vec![
        docker_check(diagnose_docker().await),
        config_check(ProvisionConfig::resolve(&ConfigOverrides::default())),
    ];

    if json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        for check in &checks {
            let mark = if check.ok { "✓" } else { "✗" };
            println!("  {} {:<8} {}", mark, check.name, check.detail);
        }
    }

    let failed = checks.iter().filter(|c| !c.ok).count();
    if failed > 0 {
        anyhow::bail!("{} of {} checks failed", failed, checks.len());
    }
    Ok(())
}

fn docker_check(diagnosis: DockerDiagnosis) -> Check {
    Check {
        name: "docker",
        ok: diagnosis.is_ready(),
        detail: diagnosis.summary(),
    }
}

fn config_check(resolved: Result<ProvisionConfig, crate::error::ConfigError>) -> Check {
    match resolved {
        Ok(config) => Check {
            name: "config",
            ok: true,
            detail: format!("{} on network {}", config.image, config.network_name),
        },
        Err(e) => Check {
            name: "config",
            ok: false,
            detail: e.to_string(),
        },
    }
}
