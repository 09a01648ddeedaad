pub mod commands;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cronweaver")]
#[command(author = "CronWeaver Team")]
#[command(version = "0.1.0")]
#[command(
    about = "Cron-style job runner with persisted state, dependency ordering and backfill",
    long_about = None
)]
pub struct Cli {
    /// Path to the admin configuration file
    #[arg(long = "admin.conf", value_name = "PATH", default_value = "cronweaver.ini")]
    pub admin_conf: PathBuf,

    /// Print each configured job and its persisted state
    #[arg(long)]
    pub list: bool,

    /// Delete the state row for one job; the run log is kept
    #[arg(long, value_name = "ID")]
    pub reset_job: Option<String>,

    /// Restrict the run to a single job (refused for backfill jobs)
    #[arg(long, value_name = "ID")]
    pub job: Option<String>,

    /// Bypass due-time and dependency checks; never applies to backfill
    /// jobs and never overrides an ongoing claim
    #[arg(long)]
    pub force: bool,

    /// Validate the configuration; the exit code is the number of
    /// misconfigured jobs
    #[arg(long)]
    pub configtest: bool,

    /// Emit a Nagios-style health line from the latest run-log entries
    #[arg(long)]
    pub nagios: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_invocation_is_a_plain_run() {
        let cli = Cli::parse_from(["cronweaver"]);
        assert!(!cli.list && !cli.configtest && !cli.nagios && !cli.force);
        assert_eq!(cli.job, None);
        assert_eq!(cli.reset_job, None);
        assert_eq!(cli.admin_conf, PathBuf::from("cronweaver.ini"));
    }

    #[test]
    fn test_admin_conf_flag_uses_dotted_name() {
        let cli = Cli::parse_from(["cronweaver", "--admin.conf", "/etc/cronweaver.ini", "--list"]);
        assert_eq!(cli.admin_conf, PathBuf::from("/etc/cronweaver.ini"));
        assert!(cli.list);
    }

    #[test]
    fn test_job_with_force() {
        let cli = Cli::parse_from(["cronweaver", "--job", "reports", "--force"]);
        assert_eq!(cli.job.as_deref(), Some("reports"));
        assert!(cli.force);
    }
}
