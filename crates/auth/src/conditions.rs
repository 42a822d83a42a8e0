//! Contextual conditions attached to permission rules.
//!
//! Each condition is a pure function of `(subject, context, now)`.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use regiongate_core::SubjectId;

use crate::PermissionContext;

/// A recurring local-time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    /// Exclusive. A window with `start > end` wraps past midnight; `start == end`
    /// covers the whole day.
    pub end: NaiveTime,
    /// Allowed local weekdays. Empty means every day.
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl TimeWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> Result<bool, String> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| format!("invalid UTC offset of {} minutes", self.utc_offset_minutes))?;
        let local = now.with_timezone(&offset);

        if !self.weekdays.is_empty() && !self.weekdays.contains(&local.weekday()) {
            return Ok(false);
        }

        let t = local.time();
        Ok(if self.start == self.end {
            true
        } else if self.start < self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionCondition {
    /// The request must target a known region; with `require_assigned`, one the
    /// subject is assigned to.
    Region { require_assigned: bool },
    TimeWindow(TimeWindow),
    /// The resource must belong to the subject (or, with `allow_team`, a teammate).
    OwnerOnly { allow_team: bool },
    /// Usage must stay strictly below each configured limit.
    Quota {
        max_per_day: Option<u32>,
        max_per_month: Option<u32>,
    },
}

impl PermissionCondition {
    /// `Ok(())` when the condition holds, otherwise a displayable reason.
    pub fn evaluate(
        &self,
        subject: SubjectId,
        ctx: &PermissionContext,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        match self {
            PermissionCondition::Region { require_assigned } => {
                let region = ctx
                    .region
                    .as_ref()
                    .ok_or_else(|| "request has no region".to_string())?;
                if !require_assigned {
                    return Ok(());
                }
                match &ctx.assigned_regions {
                    Some(scope) if scope.covers(region) => Ok(()),
                    Some(_) => Err(format!("region '{region}' is not assigned to the subject")),
                    None => Err("subject's assigned regions are unknown".to_string()),
                }
            }
            PermissionCondition::TimeWindow(window) => {
                if window.contains(now)? {
                    Ok(())
                } else {
                    Err(format!(
                        "outside allowed time window {}-{}",
                        window.start.format("%H:%M"),
                        window.end.format("%H:%M")
                    ))
                }
            }
            PermissionCondition::OwnerOnly { allow_team } => match ctx.resource_owner {
                None => Err("resource owner is unknown".to_string()),
                Some(owner) if owner == subject => Ok(()),
                Some(owner) if *allow_team && ctx.team.contains(&owner) => Ok(()),
                Some(_) => Err("resource belongs to another subject".to_string()),
            },
            PermissionCondition::Quota {
                max_per_day,
                max_per_month,
            } => {
                if let Some(max) = max_per_day {
                    if ctx.usage.today >= *max {
                        return Err(format!("daily quota of {max} reached"));
                    }
                }
                if let Some(max) = max_per_month {
                    if ctx.usage.this_month >= *max {
                        return Err(format!("monthly quota of {max} reached"));
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegionScope;
    use chrono::TimeZone;
    use regiongate_geo::RegionKey;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn time_window_applies_offset_and_weekdays() {
        // 09:00-18:00 IST on weekdays.
        let window = TimeWindow {
            start: hm(9, 0),
            end: hm(18, 0),
            weekdays: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            utc_offset_minutes: 330,
        };
        // 2026-10-14 is a Wednesday. 04:00 UTC = 09:30 IST.
        assert!(window.contains(at(2026, 10, 14, 4, 0)).unwrap());
        // 13:00 UTC = 18:30 IST.
        assert!(!window.contains(at(2026, 10, 14, 13, 0)).unwrap());
        // Saturday.
        assert!(!window.contains(at(2026, 10, 17, 4, 0)).unwrap());
    }

    #[test]
    fn time_window_wraps_midnight() {
        let night = TimeWindow {
            start: hm(22, 0),
            end: hm(6, 0),
            weekdays: vec![],
            utc_offset_minutes: 0,
        };
        assert!(night.contains(at(2026, 1, 1, 23, 0)).unwrap());
        assert!(night.contains(at(2026, 1, 1, 5, 59)).unwrap());
        assert!(!night.contains(at(2026, 1, 1, 12, 0)).unwrap());
    }

    #[test]
    fn region_condition_checks_assignment() {
        let subject = SubjectId::new();
        let cond = PermissionCondition::Region {
            require_assigned: true,
        };
        let assigned = RegionScope::only([RegionKey::new("Maharashtra")]);

        let ok = PermissionContext::new()
            .with_region(RegionKey::new("maharashtra"))
            .with_assigned_regions(assigned.clone());
        assert!(cond.evaluate(subject, &ok, Utc::now()).is_ok());

        let elsewhere = PermissionContext::new()
            .with_region(RegionKey::new("gujarat"))
            .with_assigned_regions(assigned);
        assert!(cond.evaluate(subject, &elsewhere, Utc::now()).is_err());

        let no_region = PermissionContext::new();
        let relaxed = PermissionCondition::Region {
            require_assigned: false,
        };
        assert!(relaxed.evaluate(subject, &no_region, Utc::now()).is_err());
    }

    #[test]
    fn owner_only_respects_team_flag() {
        let me = SubjectId::new();
        let teammate = SubjectId::new();
        let ctx = PermissionContext::new()
            .with_owner(teammate)
            .with_team_member(teammate);

        let strict = PermissionCondition::OwnerOnly { allow_team: false };
        let team = PermissionCondition::OwnerOnly { allow_team: true };
        assert!(strict.evaluate(me, &ctx, Utc::now()).is_err());
        assert!(team.evaluate(me, &ctx, Utc::now()).is_ok());

        let mine = PermissionContext::new().with_owner(me);
        assert!(strict.evaluate(me, &mine, Utc::now()).is_ok());
    }

    #[test]
    fn quota_is_exclusive_upper_bound() {
        let subject = SubjectId::new();
        let quota = PermissionCondition::Quota {
            max_per_day: Some(10),
            max_per_month: Some(100),
        };
        let under = PermissionContext::new().with_usage(9, 50);
        let at_day_limit = PermissionContext::new().with_usage(10, 50);
        let at_month_limit = PermissionContext::new().with_usage(1, 100);

        assert!(quota.evaluate(subject, &under, Utc::now()).is_ok());
        assert!(quota.evaluate(subject, &at_day_limit, Utc::now()).is_err());
        assert!(quota.evaluate(subject, &at_month_limit, Utc::now()).is_err());
    }

    #[test]
    fn conditions_deserialize_from_tagged_json() {
        let json = r#"[
            {"type": "region", "require_assigned": true},
            {"type": "time_window", "start": "09:00:00", "end": "17:00:00", "weekdays": ["Mon"], "utc_offset_minutes": 330},
            {"type": "quota", "max_per_day": 5, "max_per_month": null}
        ]"#;
        let conds: Vec<PermissionCondition> = serde_json::from_str(json).unwrap();
        assert_eq!(conds.len(), 3);
        assert!(matches!(conds[1], PermissionCondition::TimeWindow(_)));
    }
}
