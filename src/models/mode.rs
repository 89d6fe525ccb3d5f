use std::{fmt, str::FromStr};

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/// Task domain chosen on the home screen; sent to the analysis oracle as its domain tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    FirstAid,
    Repair,
    Assembly,
    Robotics,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::FirstAid => "first_aid",
            TaskMode::Repair => "repair",
            TaskMode::Assembly => "assembly",
            TaskMode::Robotics => "robotics",
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_aid" | "firstaid" => Ok(TaskMode::FirstAid),
            "repair" => Ok(TaskMode::Repair),
            "assembly" => Ok(TaskMode::Assembly),
            "robotics" => Ok(TaskMode::Robotics),
            other => Err(anyhow!("unknown task mode '{other}'")),
        }
    }
}
