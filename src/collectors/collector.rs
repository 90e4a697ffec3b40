use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collectors::command::{Command, Script};
use crate::collectors::directory::Directory;
use crate::collectors::event_log::EventLog;
use crate::collectors::snapshot::{Environment, Hostname};
use crate::error::CollectResult;
use crate::isolation::IsolatedExecutor;
use crate::models::TimeWindow;

/// What a collectable gets to work with.
pub struct CollectContext<'a> {
    /// Root of the run's working tree
    pub target_dir: &'a Path,
    pub window: &'a TimeWindow,
    /// Runs isolated work on behalf of the collectable
    pub executor: &'a IsolatedExecutor,
}

/// A unit of diagnostic data collection.
#[async_trait]
pub trait Collectable: fmt::Display + Send + Sync {
    async fn collect(&self, ctx: &CollectContext<'_>) -> CollectResult<()>;
}

/// A single file, collected regardless of its age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub filepath: PathBuf,
}

/// Every kind of item an item list can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Directory(Directory),
    File(FileSpec),
    Command(Command),
    Script(Script),
    EventLog(EventLog),
    Environment,
    Hostname,
}

impl Item {
    pub fn directory(dirname: impl Into<PathBuf>, regex_basename: &str) -> Self {
        Item::Directory(Directory::new(dirname, regex_basename))
    }

    pub fn file(filepath: impl Into<PathBuf>) -> Self {
        Item::File(FileSpec { filepath: filepath.into() })
    }

    pub fn command(executable: &str, args: &[&str]) -> Self {
        Item::Command(Command::new(executable, args))
    }

    /// Apply `f` to every path-like string (directories, files, executables)
    pub fn map_paths<F: Fn(&str) -> String>(&mut self, f: F) {
        let map_path = |path: &mut PathBuf| {
            *path = PathBuf::from(f(&path.to_string_lossy()));
        };
        match self {
            Item::Directory(directory) => map_path(&mut directory.dirname),
            Item::File(spec) => map_path(&mut spec.filepath),
            Item::Command(command) => {
                command.executable = f(&command.executable);
                command.args = command.args.iter().map(|arg| f(arg)).collect();
            }
            Item::Script(_) | Item::EventLog(_) | Item::Environment | Item::Hostname => {}
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Directory(directory) => fmt::Display::fmt(directory, f),
            Item::File(spec) => fmt::Display::fmt(&Directory::file(&spec.filepath), f),
            Item::Command(command) => fmt::Display::fmt(command, f),
            Item::Script(script) => fmt::Display::fmt(script, f),
            Item::EventLog(event_log) => fmt::Display::fmt(event_log, f),
            Item::Environment => fmt::Display::fmt(&Environment, f),
            Item::Hostname => fmt::Display::fmt(&Hostname, f),
        }
    }
}

#[async_trait]
impl Collectable for Item {
    async fn collect(&self, ctx: &CollectContext<'_>) -> CollectResult<()> {
        match self {
            Item::Directory(directory) => directory.collect(ctx).await,
            Item::File(spec) => Directory::file(&spec.filepath).collect(ctx).await,
            Item::Command(command) => command.collect(ctx).await,
            Item::Script(script) => script.collect(ctx).await,
            Item::EventLog(event_log) => event_log.collect(ctx).await,
            Item::Environment => Environment.collect(ctx).await,
            Item::Hostname => Hostname.collect(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_yaml_shapes() {
        let yaml = r#"
- type: directory
  dirname: /var/log
  regex_basename: messages
  recursive: true
- type: file
  filepath: /etc/os-release
- type: command
  executable: uname
  args: ["-a"]
- type: environment
- type: hostname
- type: event_log
  logs: [Setup]
"#;
        let items: Vec<Item> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(items.len(), 6);
        match &items[0] {
            Item::Directory(directory) => {
                assert!(directory.recursive);
                assert!(directory.timeframe_only);
                assert_eq!(directory.timeout_in_seconds, 60);
            }
            other => panic!("unexpected item {:?}", other),
        }
        assert_eq!(items[1], Item::file("/etc/os-release"));
        assert_eq!(items[2], Item::command("uname", &["-a"]));
        assert_eq!(items[3], Item::Environment);
        assert_eq!(items[4], Item::Hostname);
        assert_eq!(items[5], Item::EventLog(EventLog::new(&["Setup"])));
    }

    #[test]
    fn test_item_display() {
        assert_eq!(Item::Environment.to_string(), "environment variables");
        assert_eq!(Item::Hostname.to_string(), "hostname");
        assert_eq!(Item::command("uname", &["-a"]).to_string(), "command uname -a");
        assert_eq!(
            Item::file("/etc/hostname").to_string(),
            "files \"hostname$\" from /etc"
        );
    }

    #[test]
    fn test_map_paths() {
        let mut item = Item::command("$TOOLS/bin/tool", &["--dir", "$TOOLS"]);
        item.map_paths(|path| path.replace("$TOOLS", "/opt/tools"));
        assert_eq!(item, Item::command("/opt/tools/bin/tool", &["--dir", "/opt/tools"]));

        let mut item = Item::directory("%SystemRoot%/Logs", ".*");
        item.map_paths(|path| path.replace("%SystemRoot%", "C:/Windows"));
        assert_eq!(item, Item::directory("C:/Windows/Logs", ".*"));
    }
}
