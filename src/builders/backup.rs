//! Scheduled database backups, one cron job per backup of the resource.

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::batch::v1::CronJobSpec;
use k8s_openapi::api::batch::v1::JobSpec;
use k8s_openapi::api::batch::v1::JobTemplateSpec;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;

use super::labels;
use super::named_meta;
use super::placement;
use super::postgres;
use super::value_env;
use super::BACKUP;
use crate::config::Config;
use crate::crd::Backup;
use crate::crd::UnifiedPushServer;
use crate::error::Result;
use crate::TryResource;

/// Service account the backup jobs run as; provisioned by the cluster admin.
pub const SERVICE_ACCOUNT: &str = "backupjob";

const ENTRYPOINT: &str = "/opt/intly/tools/entrypoint.sh";

pub fn backup_cron_jobs(server: &UnifiedPushServer, config: &Config) -> Result<Vec<CronJob>> {
    server
        .spec
        .backups
        .iter()
        .map(|backup| backup_cron_job(server, config, backup))
        .collect()
}

fn backup_cron_job(server: &UnifiedPushServer, config: &Config, backup: &Backup) -> Result<CronJob> {
    let namespace = server.try_namespace()?;
    let mut job_labels = backup.labels.clone().unwrap_or_default();
    job_labels.extend(labels(server, BACKUP));

    let mut command = vec![
        ENTRYPOINT.to_owned(),
        "-c".to_owned(),
        "postgres".to_owned(),
        "-n".to_owned(),
        namespace.clone(),
        "-b".to_owned(),
        "s3".to_owned(),
    ];
    let mut env = vec![
        value_env("BACKEND_SECRET_NAME", &backup.backend_secret_name),
        value_env(
            "BACKEND_SECRET_NAMESPACE",
            backup.backend_secret_namespace.as_deref().unwrap_or(&namespace),
        ),
        value_env("COMPONENT_SECRET_NAME", &postgres::secret_name(server)),
        value_env("COMPONENT_SECRET_NAMESPACE", &namespace),
    ];
    if let Some(encryption_secret) = &backup.encryption_key_secret_name {
        command.extend(["-e".to_owned(), "gpg".to_owned()]);
        env.extend([
            value_env("ENCRYPTION_SECRET_NAME", encryption_secret),
            value_env(
                "ENCRYPTION_SECRET_NAMESPACE",
                backup.encryption_key_secret_namespace.as_deref().unwrap_or(&namespace),
            ),
        ]);
    }

    let (affinity, tolerations) = placement(server);

    Ok(CronJob {
        metadata: named_meta(server, &backup.name, job_labels)?,
        spec: Some(CronJobSpec {
            schedule: backup.schedule.clone(),
            concurrency_policy: Some("Forbid".to_owned()),
            job_template: JobTemplateSpec {
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        spec: Some(PodSpec {
                            service_account_name: Some(SERVICE_ACCOUNT.to_owned()),
                            restart_policy: Some("OnFailure".to_owned()),
                            containers: vec![Container {
                                name: "backup-cronjob".to_owned(),
                                image: Some(config.backup_image.clone()),
                                image_pull_policy: Some("Always".to_owned()),
                                command: Some(command),
                                env: Some(env),
                                ..Default::default()
                            }],
                            affinity,
                            tolerations,
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::fixtures::server_with;
    use crate::crd::UnifiedPushServerSpec;
    use std::collections::BTreeMap;

    fn backup(name: &str) -> Backup {
        Backup {
            name: name.to_owned(),
            schedule: "0 * * * *".to_owned(),
            backend_secret_name: "s3".to_owned(),
            ..Default::default()
        }
    }

    fn container(job: &CronJob) -> &Container {
        &job.spec.as_ref().unwrap().job_template.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn test_one_job_per_backup() {
        // Given: A server with two backups
        let server = server_with(
            "example",
            "push",
            UnifiedPushServerSpec {
                backups: vec![backup("hourly"), backup("daily")],
                ..Default::default()
            },
        );

        // When: Building the jobs
        let jobs = backup_cron_jobs(&server, &Config::default()).unwrap();

        // Then: Each backup gets a job carrying the backup selector labels
        let names: Vec<_> = jobs.iter().map(|job| job.metadata.name.as_deref().unwrap()).collect();
        assert_eq!(names, ["hourly", "daily"]);
        assert_eq!(jobs[0].metadata.labels.as_ref().unwrap()["service"], "example-backup");
        assert_eq!(jobs[0].spec.as_ref().unwrap().schedule, "0 * * * *");
    }

    #[test]
    fn test_encryption_is_optional() {
        // Given: A plain and an encrypted backup with custom labels
        let mut encrypted = backup("encrypted");
        encrypted.encryption_key_secret_name = Some("gpg-key".to_owned());
        encrypted.labels = Some(BTreeMap::from([("team".to_owned(), "mobile".to_owned())]));
        let server = server_with(
            "example",
            "push",
            UnifiedPushServerSpec {
                backups: vec![backup("plain"), encrypted],
                ..Default::default()
            },
        );

        // When: Building the jobs
        let jobs = backup_cron_jobs(&server, &Config::default()).unwrap();

        // Then: Only the encrypted one asks for gpg
        let plain = container(&jobs[0]);
        let encrypted = container(&jobs[1]);
        assert!(!plain.command.as_ref().unwrap().contains(&"gpg".to_owned()));
        assert!(encrypted.command.as_ref().unwrap().contains(&"gpg".to_owned()));
        assert!(encrypted
            .env
            .as_ref()
            .unwrap()
            .iter()
            .any(|var| var.name == "ENCRYPTION_SECRET_NAMESPACE" && var.value.as_deref() == Some("push")));
        assert_eq!(jobs[1].metadata.labels.as_ref().unwrap()["team"], "mobile");
    }

    #[test]
    fn test_no_backups_no_jobs() {
        let server = server_with("example", "push", UnifiedPushServerSpec::default());

        assert!(backup_cron_jobs(&server, &Config::default()).unwrap().is_empty());
    }
}
