//! Database server collaborator.
//!
//! Queries a SQL Server instance for its databases and default data
//! directory and attaches a clone's files as a new database. `SqlcmdServer`
//! drives the `sqlcmd` client from the machine `dbclone` runs on.

use crate::error::{Error, Result};
use crate::gateway::{Credential, Executor, LocalExecutor, Target};

/// Operations the provisioning workflow needs from a database server.
pub trait DatabaseServer: Send + Sync {
    /// Names of all databases on the instance.
    fn list_databases(&self, instance: &str, credential: Option<&Credential>)
        -> Result<Vec<String>>;

    /// Directory new data files are placed in by default.
    fn default_data_directory(
        &self,
        instance: &str,
        credential: Option<&Credential>,
    ) -> Result<String>;

    /// Attach `files` as database `database`.
    fn attach_database(
        &self,
        instance: &str,
        credential: Option<&Credential>,
        database: &str,
        files: &[String],
    ) -> Result<()>;
}

/// Machine name part of an instance name (`HOST\INSTANCE`, `HOST,1433`,
/// `tcp:HOST`).
pub fn instance_host(instance: &str) -> &str {
    let name = instance.trim();
    let name = name
        .strip_prefix("tcp:")
        .or_else(|| name.strip_prefix("TCP:"))
        .unwrap_or(name);
    let end = name.find(['\\', ',']).unwrap_or(name.len());
    &name[..end]
}

/// Quote an identifier for T-SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal for T-SQL.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Statement attaching `files` as `database`.
pub fn attach_statement(database: &str, files: &[String]) -> String {
    let file_specs = files
        .iter()
        .map(|f| format!("(FILENAME = {})", quote_literal(f)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE DATABASE {} ON {} FOR ATTACH",
        quote_identifier(database),
        file_specs
    )
}

/// Database server reached through the `sqlcmd` client.
pub struct SqlcmdServer {
    executor: Box<dyn Executor>,
}

impl Default for SqlcmdServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlcmdServer {
    pub fn new() -> Self {
        Self::with_executor(Box::new(LocalExecutor))
    }

    pub fn with_executor(executor: Box<dyn Executor>) -> Self {
        Self { executor }
    }

    fn args(instance: &str, credential: Option<&Credential>, query: &str) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            instance.to_string(),
            "-b".to_string(),
            "-h".to_string(),
            "-1".to_string(),
            "-W".to_string(),
        ];
        match credential {
            Some(cred) => {
                args.push("-U".to_string());
                args.push(cred.username.clone());
                if let Some(password) = &cred.password {
                    args.push("-P".to_string());
                    args.push(password.clone());
                }
            }
            None => args.push("-E".to_string()),
        }
        args.push("-Q".to_string());
        args.push(format!("SET NOCOUNT ON; {}", query));
        args
    }

    fn query(
        &self,
        instance: &str,
        credential: Option<&Credential>,
        query: &str,
    ) -> Result<Vec<String>> {
        let local = Target::new("localhost", None);
        let output = self
            .executor
            .run(&local, "sqlcmd", &Self::args(instance, credential, query))
            .map_err(|e| Error::ServerUnavailable {
                sql_instance: instance.to_string(),
                message: e.to_string(),
            })?;
        if !output.success {
            let message = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(Error::ServerUnavailable {
                sql_instance: instance.to_string(),
                message,
            });
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

impl DatabaseServer for SqlcmdServer {
    fn list_databases(
        &self,
        instance: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<String>> {
        self.query(instance, credential, "SELECT name FROM sys.databases")
    }

    fn default_data_directory(
        &self,
        instance: &str,
        credential: Option<&Credential>,
    ) -> Result<String> {
        let rows = self.query(
            instance,
            credential,
            "SELECT SERVERPROPERTY('InstanceDefaultDataPath')",
        )?;
        match rows.into_iter().next() {
            Some(dir) if dir != "NULL" => Ok(dir),
            _ => Err(Error::ServerUnavailable {
                sql_instance: instance.to_string(),
                message: "server reported no default data path".to_string(),
            }),
        }
    }

    fn attach_database(
        &self,
        instance: &str,
        credential: Option<&Credential>,
        database: &str,
        files: &[String],
    ) -> Result<()> {
        if files.is_empty() {
            return Err(Error::AttachFailed {
                sql_instance: instance.to_string(),
                database: database.to_string(),
                message: "no database files to attach".to_string(),
            });
        }
        self.query(instance, credential, &attach_statement(database, files))
            .map_err(|e| Error::AttachFailed {
                sql_instance: instance.to_string(),
                database: database.to_string(),
                message: e.to_string(),
            })?;
        log::debug!("Attached {} on {} from {} file(s)", database, instance, files.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CommandOutput;
    use std::sync::{Arc, Mutex};

    struct CannedSqlcmd {
        output: CommandOutput,
        args: Arc<Mutex<Vec<String>>>,
    }

    impl Executor for CannedSqlcmd {
        fn test_connectivity(&self, _target: &Target) -> bool {
            true
        }

        fn run(&self, _target: &Target, _program: &str, args: &[String]) -> Result<CommandOutput> {
            *self.args.lock().unwrap() = args.to_vec();
            Ok(self.output.clone())
        }
    }

    fn server(success: bool, stdout: &str, stderr: &str) -> (SqlcmdServer, Arc<Mutex<Vec<String>>>) {
        let args = Arc::new(Mutex::new(Vec::new()));
        let exec = CannedSqlcmd {
            output: CommandOutput {
                success,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            args: Arc::clone(&args),
        };
        (SqlcmdServer::with_executor(Box::new(exec)), args)
    }

    #[test]
    fn test_instance_host() {
        assert_eq!(instance_host("HOSTA"), "HOSTA");
        assert_eq!(instance_host("HOSTA\\SQL2019"), "HOSTA");
        assert_eq!(instance_host("tcp:hosta.corp.local,1433"), "hosta.corp.local");
    }

    #[test]
    fn test_attach_statement_quotes() {
        let stmt = attach_statement(
            "Sales]DB",
            &["C:\\clone\\x\\o'brien.mdf".to_string(), "C:\\clone\\x\\log.ldf".to_string()],
        );
        assert_eq!(
            stmt,
            "CREATE DATABASE [Sales]]DB] ON (FILENAME = N'C:\\clone\\x\\o''brien.mdf'), \
             (FILENAME = N'C:\\clone\\x\\log.ldf') FOR ATTACH"
        );
    }

    #[test]
    fn test_list_databases() {
        let (server, args) = server(true, "master\ntempdb\nDB1\n\n", "");
        let dbs = server.list_databases("HOSTA", None).unwrap();
        assert_eq!(dbs, vec!["master", "tempdb", "DB1"]);
        assert!(args.lock().unwrap().contains(&"-E".to_string()));
    }

    #[test]
    fn test_sql_login_arguments() {
        let (server, args) = server(true, "C:\\data\\\n", "");
        let cred = Credential::new("sa", Some("secret".to_string()));
        let dir = server.default_data_directory("HOSTA", Some(&cred)).unwrap();
        assert_eq!(dir, "C:\\data\\");

        let args = args.lock().unwrap();
        assert!(args.windows(2).any(|w| w[0] == "-U" && w[1] == "sa"));
        assert!(!args.contains(&"-E".to_string()));
    }

    #[test]
    fn test_query_failure_is_unavailable() {
        let (server, _) = server(false, "", "Login timeout expired");
        let err = server.list_databases("HOSTA", None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unavailable);
        assert!(err.to_string().contains("Login timeout"));
    }

    #[test]
    fn test_attach_failure() {
        let (server, _) = server(false, "Msg 5120", "");
        let err = server
            .attach_database("HOSTA", None, "DB1", &["/clone/x/db.mdf".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::AttachFailed { .. }));
    }

    #[test]
    fn test_attach_without_files() {
        let (server, args) = server(true, "", "");
        let err = server.attach_database("HOSTA", None, "DB1", &[]).unwrap_err();
        assert!(matches!(err, Error::AttachFailed { .. }));
        assert!(args.lock().unwrap().is_empty());
    }
}
