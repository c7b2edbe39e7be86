//! crates/momentbox_core/src/appliance.rs
//!
//! The device registry's pure half: the master template catalog, the
//! behavior classes, and the control/simulate state transitions. The
//! transitions mutate an [`Appliance`] in place and report a [`UsageDelta`]
//! so the caller knows whether the quest engine must be notified.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{Appliance, ApplianceKind, RunState};
use crate::ports::{PortError, PortResult};

/// How an appliance behaves under `simulate`, replacing per-kind string
/// matching with a closed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorClass {
    /// Runs discrete cycles: waiting -> running -> completed -> waiting.
    Cycle,
    /// Robot vacuum: docked <-> cleaning, docking counts as a finished run.
    Vacuum,
    /// Always-on style appliances that simply toggle power.
    Toggle,
}

impl ApplianceKind {
    pub fn behavior(&self) -> BehaviorClass {
        match self {
            ApplianceKind::Washer
            | ApplianceKind::Dryer
            | ApplianceKind::Dishwasher
            | ApplianceKind::Styler
            | ApplianceKind::ShoeCare
            | ApplianceKind::Oven
            | ApplianceKind::MassageChair => BehaviorClass::Cycle,
            ApplianceKind::RobotVacuum => BehaviorClass::Vacuum,
            ApplianceKind::Refrigerator
            | ApplianceKind::Tv
            | ApplianceKind::AirConditioner
            | ApplianceKind::AirPurifier
            | ApplianceKind::AeroTower
            | ApplianceKind::Dehumidifier => BehaviorClass::Toggle,
        }
    }
}

//=========================================================================================
// Master templates
//=========================================================================================

/// Immutable master catalog entry an instance is stamped from.
#[derive(Debug, Clone)]
pub struct ApplianceTemplate {
    pub id: &'static str,
    pub kind: ApplianceKind,
    pub category: &'static str,
    pub model_name: &'static str,
    pub default_power: bool,
    pub default_status: Option<RunState>,
    pub default_course: Option<&'static str>,
    pub courses: &'static [&'static str],
    /// Per-course run time in minutes, matching `courses` by position.
    pub course_minutes: &'static [i64],
    pub default_mode: Option<&'static str>,
    pub modes: &'static [&'static str],
    pub default_fan_speed: Option<&'static str>,
    pub fan_speeds: &'static [&'static str],
    pub default_temperature: Option<i32>,
}

/// The seeded master catalog. Read-only reference data.
pub const MASTER_TEMPLATES: &[ApplianceTemplate] = &[
    ApplianceTemplate {
        id: "REFRIGERATOR_SMART",
        kind: ApplianceKind::Refrigerator,
        category: "refrigeration",
        model_name: "Smart Fridge 800",
        default_power: true,
        default_status: None,
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: None,
        modes: &[],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: Some(3),
    },
    ApplianceTemplate {
        id: "WASHER_AI",
        kind: ApplianceKind::Washer,
        category: "laundry",
        model_name: "AI Drum Washer 21",
        default_power: false,
        default_status: Some(RunState::Waiting),
        default_course: Some("standard"),
        courses: &["standard", "delicate", "quick_wash", "bedding", "wool"],
        course_minutes: &[60, 50, 20, 90, 40],
        default_mode: None,
        modes: &[],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "DRYER_DUAL",
        kind: ApplianceKind::Dryer,
        category: "laundry",
        model_name: "Dual Inverter Dryer 17",
        default_power: false,
        default_status: Some(RunState::Waiting),
        default_course: Some("standard"),
        courses: &["standard", "delicates", "time_dry", "air_dry", "bedding"],
        course_minutes: &[120, 90, 60, 30, 150],
        default_mode: None,
        modes: &[],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "DISHWASHER_STEAM",
        kind: ApplianceKind::Dishwasher,
        category: "kitchen",
        model_name: "TrueSteam Dishwasher 14",
        default_power: false,
        default_status: Some(RunState::Waiting),
        default_course: Some("auto"),
        courses: &["auto", "heavy", "eco", "quick", "sanitize"],
        course_minutes: &[120, 150, 180, 60, 90],
        default_mode: None,
        modes: &[],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "STYLER_STEAM",
        kind: ApplianceKind::Styler,
        category: "laundry",
        model_name: "Steam Styler 5",
        default_power: false,
        default_status: Some(RunState::Waiting),
        default_course: Some("refresh"),
        courses: &["refresh", "sanitize", "gentle_dry", "down_jacket"],
        course_minutes: &[30, 48, 60, 70],
        default_mode: None,
        modes: &[],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "SHOE_CARE_CASE",
        kind: ApplianceKind::ShoeCare,
        category: "laundry",
        model_name: "Shoe Care Case 3",
        default_power: false,
        default_status: Some(RunState::Waiting),
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: Some("deodorize"),
        modes: &["deodorize", "dry", "sanitize"],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "OVEN_ELECTRIC",
        kind: ApplianceKind::Oven,
        category: "kitchen",
        model_name: "Electric Oven 66",
        default_power: false,
        default_status: Some(RunState::Waiting),
        default_course: Some("convection"),
        courses: &["convection", "grill", "steam", "air_fry"],
        course_minutes: &[30, 20, 40, 25],
        default_mode: None,
        modes: &[],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: Some(180),
    },
    ApplianceTemplate {
        id: "MASSAGE_CHAIR_FULL",
        kind: ApplianceKind::MassageChair,
        category: "living",
        model_name: "Full Body Massage Chair",
        default_power: false,
        default_status: Some(RunState::Waiting),
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: Some("relax"),
        modes: &["relax", "massage", "stretch"],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "ROBOT_VACUUM_R9",
        kind: ApplianceKind::RobotVacuum,
        category: "cleaning",
        model_name: "Robot Vacuum R9",
        default_power: false,
        default_status: Some(RunState::Docked),
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: Some("auto"),
        modes: &["auto", "turbo", "silent", "spot"],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "TV_OLED_65",
        kind: ApplianceKind::Tv,
        category: "entertainment",
        model_name: "OLED TV 65",
        default_power: false,
        default_status: None,
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: None,
        modes: &[],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "AC_INVERTER",
        kind: ApplianceKind::AirConditioner,
        category: "climate",
        model_name: "Inverter Air Conditioner",
        default_power: false,
        default_status: None,
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: Some("cool"),
        modes: &["cool", "dry", "fan", "heat"],
        default_fan_speed: Some("auto"),
        fan_speeds: &["low", "medium", "high", "auto"],
        default_temperature: Some(24),
    },
    ApplianceTemplate {
        id: "AIR_PURIFIER_360",
        kind: ApplianceKind::AirPurifier,
        category: "air_quality",
        model_name: "360 Air Purifier",
        default_power: true,
        default_status: None,
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: Some("auto"),
        modes: &["auto", "sleep", "high", "low"],
        default_fan_speed: Some("medium"),
        fan_speeds: &["low", "medium", "high"],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "AERO_TOWER",
        kind: ApplianceKind::AeroTower,
        category: "air_quality",
        model_name: "Aero Tower",
        default_power: true,
        default_status: None,
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: Some("auto"),
        modes: &["auto", "sleep", "turbo"],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
    ApplianceTemplate {
        id: "DEHUMIDIFIER_20",
        kind: ApplianceKind::Dehumidifier,
        category: "air_quality",
        model_name: "Dehumidifier 20L",
        default_power: false,
        default_status: None,
        default_course: None,
        courses: &[],
        course_minutes: &[],
        default_mode: Some("auto"),
        modes: &["auto", "continuous", "clothes_dry"],
        default_fan_speed: None,
        fan_speeds: &[],
        default_temperature: None,
    },
];

/// The appliance set materialized for every new account.
pub const STARTER_DEVICES: &[(&str, &str)] = &[
    ("REFRIGERATOR_SMART", "Kitchen Fridge"),
    ("WASHER_AI", "Laundry Washer"),
    ("DRYER_DUAL", "Laundry Dryer"),
    ("AC_INVERTER", "Living Room AC"),
    ("AIR_PURIFIER_360", "Living Room Purifier"),
    ("ROBOT_VACUUM_R9", "Robot Vacuum"),
    ("TV_OLED_65", "Living Room TV"),
    ("STYLER_STEAM", "Closet Styler"),
    ("DISHWASHER_STEAM", "Kitchen Dishwasher"),
    ("MASSAGE_CHAIR_FULL", "Massage Chair"),
];

pub fn find_template(template_id: &str) -> Option<&'static ApplianceTemplate> {
    MASTER_TEMPLATES.iter().find(|t| t.id == template_id)
}

pub fn categories() -> Vec<&'static str> {
    let mut cats: Vec<&'static str> = MASTER_TEMPLATES.iter().map(|t| t.category).collect();
    cats.sort_unstable();
    cats.dedup();
    cats
}

impl ApplianceTemplate {
    /// Stamps a user instance from this template.
    pub fn instantiate(&self, user_id: Uuid, name: &str, now: DateTime<Utc>) -> Appliance {
        let course_times: BTreeMap<String, i64> = self
            .courses
            .iter()
            .zip(self.course_minutes.iter())
            .map(|(c, m)| (c.to_string(), m * 60))
            .collect();
        let total_time_sec = self
            .default_course
            .and_then(|c| course_times.get(c).copied())
            .unwrap_or(0);

        Appliance {
            user_id,
            name: name.to_string(),
            kind: self.kind,
            model_name: self.model_name.to_string(),
            category: self.category.to_string(),
            power: self.default_power,
            status: self.default_status,
            course: self.default_course.map(str::to_string),
            courses: self.courses.iter().map(|c| c.to_string()).collect(),
            course_times,
            mode: self.default_mode.map(str::to_string),
            modes: self.modes.iter().map(|m| m.to_string()).collect(),
            fan_speed: self.default_fan_speed.map(str::to_string),
            fan_speeds: self.fan_speeds.iter().map(|f| f.to_string()).collect(),
            temperature: self.default_temperature,
            total_time_sec,
            remaining_time_sec: 0,
            run_count: 0,
            weekly_duration_sec: 0,
            power_on_at: if self.default_power { Some(now) } else { None },
            cycle_started_at: None,
        }
    }
}

//=========================================================================================
// Transitions
//=========================================================================================

/// A control command against one appliance instance.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum ControlCommand {
    Power(PowerValue),
    Temperature(i32),
    Mode(String),
    Course(String),
    FanSpeed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PowerValue {
    On,
    Off,
}

/// What a transition added to the lifetime counters. The quest engine only
/// cares when either field is non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDelta {
    pub duration_added_sec: i64,
    pub runs_added: i64,
}

impl UsageDelta {
    pub fn is_quest_relevant(&self) -> bool {
        self.duration_added_sec > 0 || self.runs_added > 0
    }
}

/// Accumulates the elapsed on-duration and clears the power timestamp.
/// No-op when the appliance was never marked on.
fn power_off(appliance: &mut Appliance, now: DateTime<Utc>, delta: &mut UsageDelta) {
    appliance.power = false;
    if let Some(on_at) = appliance.power_on_at.take() {
        let elapsed = (now - on_at).num_seconds().max(0);
        appliance.weekly_duration_sec += elapsed;
        delta.duration_added_sec += elapsed;
    }
}

fn power_on(appliance: &mut Appliance, now: DateTime<Utc>) {
    appliance.power = true;
    if appliance.power_on_at.is_none() {
        appliance.power_on_at = Some(now);
    }
}

/// Applies one control command. Vocabulary violations are validation errors;
/// a power command that matches the current state is a no-op.
pub fn apply_control(
    appliance: &mut Appliance,
    command: &ControlCommand,
    now: DateTime<Utc>,
) -> PortResult<UsageDelta> {
    let mut delta = UsageDelta::default();
    match command {
        ControlCommand::Power(value) => {
            let turn_on = *value == PowerValue::On;
            if appliance.power != turn_on {
                if turn_on {
                    power_on(appliance, now);
                } else {
                    power_off(appliance, now, &mut delta);
                }
            }
        }
        ControlCommand::Temperature(value) => {
            if appliance.temperature.is_none() {
                return Err(PortError::Validation(format!(
                    "'{}' has no temperature setting",
                    appliance.name
                )));
            }
            appliance.temperature = Some(*value);
        }
        ControlCommand::Mode(value) => {
            if !appliance.modes.iter().any(|m| m == value) {
                return Err(PortError::Validation(format!(
                    "mode '{value}' is not supported by '{}'",
                    appliance.name
                )));
            }
            appliance.mode = Some(value.clone());
        }
        ControlCommand::Course(value) => {
            if !appliance.courses.iter().any(|c| c == value) {
                return Err(PortError::Validation(format!(
                    "course '{value}' is not supported by '{}'",
                    appliance.name
                )));
            }
            appliance.course = Some(value.clone());
            if let Some(&secs) = appliance.course_times.get(value) {
                appliance.total_time_sec = secs;
                appliance.remaining_time_sec = secs;
            }
        }
        ControlCommand::FanSpeed(value) => {
            if !appliance.fan_speeds.iter().any(|f| f == value) {
                return Err(PortError::Validation(format!(
                    "fan speed '{value}' is not supported by '{}'",
                    appliance.name
                )));
            }
            appliance.fan_speed = Some(value.clone());
        }
    }
    Ok(delta)
}

/// Advances the appliance's run-cycle state machine one step, per its
/// behavior class.
pub fn simulate_usage(appliance: &mut Appliance, now: DateTime<Utc>) -> UsageDelta {
    let mut delta = UsageDelta::default();
    match appliance.kind.behavior() {
        BehaviorClass::Cycle => match appliance.status {
            None | Some(RunState::Waiting) => {
                appliance.status = Some(RunState::Running);
                power_on(appliance, now);
                appliance.cycle_started_at = Some(now);
                appliance.remaining_time_sec = appliance.total_time_sec;
            }
            Some(RunState::Running) => {
                appliance.status = Some(RunState::Completed);
                appliance.cycle_started_at = None;
                appliance.remaining_time_sec = 0;
                appliance.run_count += 1;
                delta.runs_added += 1;
                power_off(appliance, now, &mut delta);
            }
            Some(RunState::Completed) => {
                appliance.status = Some(RunState::Waiting);
            }
            // Vacuum states never occur on a cycle appliance.
            Some(RunState::Docked) | Some(RunState::Cleaning) => {
                appliance.status = Some(RunState::Waiting);
            }
        },
        BehaviorClass::Vacuum => match appliance.status {
            None | Some(RunState::Docked) | Some(RunState::Completed) => {
                appliance.status = Some(RunState::Cleaning);
                power_on(appliance, now);
                appliance.cycle_started_at = Some(now);
                appliance.remaining_time_sec = appliance.total_time_sec;
            }
            _ => {
                appliance.status = Some(RunState::Docked);
                appliance.cycle_started_at = None;
                appliance.remaining_time_sec = 0;
                appliance.run_count += 1;
                delta.runs_added += 1;
                power_off(appliance, now, &mut delta);
            }
        },
        BehaviorClass::Toggle => {
            if appliance.power {
                power_off(appliance, now, &mut delta);
            } else {
                power_on(appliance, now);
            }
        }
    }
    delta
}
