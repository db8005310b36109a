// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use ordermap::OrderMap;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, Registry, prelude::*, reload};

use crate::targets::TRACING_TARGETS;
use crate::{DEFAULT_LOGLEVEL, LevelFilter, trace_target};

trace_target!("tracectl", LevelFilter::INFO, &[]);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TraceCtlError {
    #[error("Invalid syntax '{0}': expected tag=level")]
    BadSyntax(String),
    #[error("Invalid level '{0}'")]
    BadLevel(String),
    #[error("Unknown tag '{0}'")]
    UnknownTag(String),
}

#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub target: &'static str,
    pub name: &'static str,
    pub level: LevelFilter,
    pub tags: Vec<&'static str>,
}

#[derive(Debug)]
struct TargetDb {
    default: LevelFilter,
    targets: OrderMap<&'static str, TargetCfg>,
    tags: OrderMap<&'static str, BTreeSet<&'static str>>,
}

impl TargetDb {
    fn from_registry(default: LevelFilter) -> Self {
        let mut db = Self {
            default,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for t in TRACING_TARGETS {
            db.register(t.target, t.name, t.level, t.tags);
        }
        db
    }

    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        // a target can always be addressed by its name
        let mut tags = tags.to_vec();
        if !tags.contains(&name) {
            tags.push(name);
        }
        for tag in &tags {
            self.tags.entry(*tag).or_default().insert(target);
        }
        let cfg = TargetCfg {
            target,
            name,
            level,
            tags,
        };
        if self.targets.insert(target, cfg).is_some() {
            warn!("Tracing target {target} declared more than once");
        }
    }

    fn env_filter(&self) -> EnvFilter {
        self.targets.values().fold(
            EnvFilter::new(self.default.to_string()),
            |filter, t| match format!("{}={}", t.target, t.level).parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(e) => {
                    error!("Bad directive for target {}: {e}", t.target);
                    filter
                }
            },
        )
    }

    fn set_tag_level(&mut self, tag: &str, level: LevelFilter) -> Result<usize, TraceCtlError> {
        let Some(members) = self.tags.get(tag) else {
            return Err(TraceCtlError::UnknownTag(tag.to_string()));
        };
        let mut changed = 0;
        for target in members {
            let Some(cfg) = self.targets.get_mut(*target) else {
                continue;
            };
            if cfg.level != level {
                cfg.level = level;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

impl Display for TargetDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:>40} │ {:>6} │ TAGS", "TARGET", "LEVEL")?;
        for t in self.targets.values() {
            writeln!(f, "{:>40} │ {:>6} │ {}", t.target, t.level, t.tags.join(","))?;
        }
        write!(f, "{:>40} │ {:>6} │ --", "(default)", self.default)
    }
}

/// Handle over the process-wide tracing subscriber
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetDb>,
    reload_filter: reload::Handle<EnvFilter, Registry>,
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetDb::from_registry(DEFAULT_LOGLEVEL);
        let (filter, reload_filter) = reload::Layer::new(db.env_filter());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_names(true)
            .with_level(true);

        // a test harness may already have installed its own subscriber
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            warn!("Tracing subscriber not installed: {e}");
        }
        Self {
            db: Mutex::new(db),
            reload_filter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TargetDb> {
        // the db holds no invariant that a panicking holder could break
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn reload(&self, db: &TargetDb) {
        if let Err(e) = self.reload_filter.reload(db.env_filter()) {
            error!("Failed to reload tracing filter: {e}");
        }
    }

    pub fn init() {
        get_trace_ctl();
    }

    /// Set the level of all targets carrying the given tag.
    ///
    /// # Errors
    ///
    /// Fails if no target has the tag.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.lock();
        let changed = db.set_tag_level(tag, level)?;
        if changed > 0 {
            self.reload(&db);
        }
        info!("Log level for tag '{tag}' set to {level} ({changed} targets changed)");
        Ok(())
    }

    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.lock();
        if db.default != level {
            db.default = level;
            self.reload(&db);
        }
    }

    #[must_use]
    pub fn default_level(&self) -> LevelFilter {
        self.lock().default
    }

    #[must_use]
    pub fn target(&self, target: &str) -> Option<TargetCfg> {
        self.lock().targets.get(target).cloned()
    }

    #[must_use]
    pub fn tags(&self) -> Vec<&'static str> {
        self.lock().tags.keys().copied().collect()
    }

    /// Apply a comma-separated list of `tag=level`. The pseudo-tag `default`
    /// sets the level of unregistered targets.
    ///
    /// # Errors
    ///
    /// Fails on bad syntax, bad levels or unknown tags. Nothing is applied in that case.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let mut parsed = OrderMap::new();
        for item in input.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let (tag, level) = item
                .split_once('=')
                .ok_or_else(|| TraceCtlError::BadSyntax(item.to_string()))?;
            let level = LevelFilter::from_str(level.trim())
                .map_err(|_| TraceCtlError::BadLevel(level.trim().to_string()))?;
            parsed.insert(tag.trim().to_string(), level);
        }

        let mut db = self.lock();
        if let Some(unknown) = parsed
            .keys()
            .find(|tag| *tag != "default" && !db.tags.contains_key(tag.as_str()))
        {
            return Err(TraceCtlError::UnknownTag(unknown.clone()));
        }
        for (tag, level) in &parsed {
            if tag == "default" {
                db.default = *level;
            } else {
                db.set_tag_level(tag, *level)?;
            }
        }
        self.reload(&db);
        Ok(())
    }

    pub fn dump(&self) {
        let db = self.lock();
        info!("\n{db}");
    }
}

/// Get the process-wide [`TracingControl`], initializing it on first use
pub fn get_trace_ctl() -> &'static TracingControl {
    static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();
    TRACING_CTL.get_or_init(TracingControl::new)
}
