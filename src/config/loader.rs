// file: src/config/loader.rs
// version: 1.1.0
// guid: d94c7e61-2b05-48f3-a7c8-e1360b9f5a24

//! Cluster specification loading and environment variable substitution

use super::ClusterSpec;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Load the cluster specification from a YAML file, expand `${VAR}`
    /// placeholders, and run defaulting + validation on the result.
    pub fn load_cluster_spec<P: AsRef<Path>>(&self, path: P) -> Result<ClusterSpec> {
        let content = fs::read_to_string(&path).map_err(|e| {
            crate::error::InstallError::Config(format!(
                "Failed to read cluster spec {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let expanded = self.expand_env_vars(&content)?;
        let mut spec: ClusterSpec = serde_yaml::from_str(&expanded)?;

        super::apply_defaults_and_validate(&mut spec)?;

        Ok(spec)
    }

    /// Expand environment variables in configuration content
    fn expand_env_vars(&self, content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| crate::error::InstallError::Config(format!("Invalid regex pattern: {}", e)))?;

        let mut result = content.to_string();
        let mut missing_vars = Vec::new();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];

            if let Some(value) = self.env_vars.get(var_name) {
                result = result.replace(placeholder, value);
            } else {
                missing_vars.push(var_name.to_string());
            }
        }

        if !missing_vars.is_empty() {
            return Err(crate::error::InstallError::Config(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            )));
        }

        Ok(result)
    }

    /// Set environment variable for substitution
    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
