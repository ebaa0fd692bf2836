// Irrigation evaluator - Zone status from soil moisture, usage roll-ups
use crate::domain::growth::round1;
use crate::domain::irrigation::{
    IrrigationStatus, IrrigationZone, MoistureBand, UsageRecord, UsageSummary, ZoneEvaluation,
    ZoneProfile,
};
use chrono::{DateTime, Duration, Utc};

const UNDER_IRRIGATED_ALERT: &str =
    "Water levels are below optimal range. Consider scheduling irrigation soon.";
const OVER_IRRIGATED_ALERT: &str =
    "Water levels are above optimal range. Hold irrigation until soil dries.";
const OPTIMAL_ALERT: &str = "Water levels are within optimal range.";

pub fn evaluate(current_moisture: f64, band: &MoistureBand) -> ZoneEvaluation {
    let status = if band.contains(current_moisture) {
        IrrigationStatus::Optimal
    } else if current_moisture < band.min {
        IrrigationStatus::UnderIrrigated
    } else {
        IrrigationStatus::OverIrrigated
    };

    let alert_text = match status {
        IrrigationStatus::UnderIrrigated => UNDER_IRRIGATED_ALERT,
        IrrigationStatus::OverIrrigated => OVER_IRRIGATED_ALERT,
        IrrigationStatus::Optimal => OPTIMAL_ALERT,
    };

    ZoneEvaluation { status, alert_text }
}

/// Evaluate a configured zone against the current moisture.
///
/// Under-irrigated zones are due now; optimal zones follow their schedule;
/// over-irrigated zones get no next irrigation until they dry out.
pub fn evaluate_zone(
    profile: &ZoneProfile,
    current_moisture: f64,
    now: DateTime<Utc>,
) -> IrrigationZone {
    let evaluation = evaluate(current_moisture, &profile.band);

    let next_irrigation = match evaluation.status {
        IrrigationStatus::UnderIrrigated => Some(now),
        IrrigationStatus::Optimal => Some(
            profile
                .last_irrigation
                .map(|last| (last + profile.interval()).max(now))
                .unwrap_or(now),
        ),
        IrrigationStatus::OverIrrigated => None,
    };

    IrrigationZone {
        name: profile.name.clone(),
        current_moisture,
        band: profile.band,
        status: evaluation.status,
        alert_text: evaluation.alert_text,
        last_irrigation: profile.last_irrigation,
        next_irrigation,
    }
}

/// Roll the ledger up into today / this week / savings against last week.
pub fn usage_summary(records: &[UsageRecord], now: DateTime<Utc>) -> UsageSummary {
    let today = now.date_naive();
    let week_start = now - Duration::days(7);
    let previous_week_start = now - Duration::days(14);

    let mut today_gallons = 0.0;
    let mut weekly_gallons = 0.0;
    let mut previous_week_gallons = 0.0;

    for record in records.iter().filter(|r| r.at <= now && r.gallons.is_finite()) {
        if record.at.date_naive() == today {
            today_gallons += record.gallons;
        }
        if record.at > week_start {
            weekly_gallons += record.gallons;
        } else if record.at > previous_week_start {
            previous_week_gallons += record.gallons;
        }
    }

    let savings_percent = if previous_week_gallons > 0.0 {
        round1((previous_week_gallons - weekly_gallons) / previous_week_gallons * 100.0)
    } else {
        0.0
    };

    UsageSummary {
        today_gallons: round1(today_gallons),
        weekly_gallons: round1(weekly_gallons),
        savings_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn band(min: f64, max: f64) -> MoistureBand {
        MoistureBand::new(min, max).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, 16, 15, 0, 0).unwrap()
    }

    fn record(at: DateTime<Utc>, zone: Option<&str>, gallons: f64) -> UsageRecord {
        UsageRecord {
            at,
            zone: zone.map(str::to_string),
            gallons,
        }
    }

    #[test]
    fn test_reference_zone_cases() {
        assert_eq!(evaluate(28.0, &band(40.0, 60.0)).status, IrrigationStatus::UnderIrrigated);
        assert_eq!(evaluate(45.0, &band(35.0, 55.0)).status, IrrigationStatus::Optimal);
        assert_eq!(evaluate(68.0, &band(30.0, 50.0)).status, IrrigationStatus::OverIrrigated);
        assert_eq!(evaluate(28.0, &band(40.0, 60.0)).alert_text, UNDER_IRRIGATED_ALERT);
    }

    #[test]
    fn test_optimal_iff_inside_band() {
        let bands = [
            band(0.0, 0.0),
            band(30.0, 50.0),
            band(35.0, 55.0),
            band(40.0, 60.0),
            band(0.0, 100.0),
        ];
        for band in bands {
            for step in 0..=200 {
                let moisture = step as f64 / 2.0;
                let optimal = evaluate(moisture, &band).status == IrrigationStatus::Optimal;
                assert_eq!(optimal, band.min <= moisture && moisture <= band.max);
            }
        }
    }

    #[test]
    fn test_band_edges_are_optimal() {
        let band = band(40.0, 60.0);
        assert_eq!(evaluate(40.0, &band).status, IrrigationStatus::Optimal);
        assert_eq!(evaluate(60.0, &band).status, IrrigationStatus::Optimal);
        assert_eq!(evaluate(39.9, &band).status, IrrigationStatus::UnderIrrigated);
        assert_eq!(evaluate(60.1, &band).status, IrrigationStatus::OverIrrigated);
    }

    #[test]
    fn test_next_irrigation_follows_status() {
        let last = Utc.with_ymd_and_hms(2023, 6, 15, 6, 0, 0).unwrap();
        let profile = ZoneProfile {
            name: "West Field Corn".to_string(),
            band: band(35.0, 55.0),
            last_irrigation: Some(last),
            interval_hours: 72,
        };

        let under = evaluate_zone(&profile, 20.0, now());
        assert_eq!(under.next_irrigation, Some(now()));

        let optimal = evaluate_zone(&profile, 45.0, now());
        assert_eq!(optimal.next_irrigation, Some(last + Duration::hours(72)));

        let over = evaluate_zone(&profile, 70.0, now());
        assert_eq!(over.next_irrigation, None);
        assert_eq!(over.last_irrigation, Some(last));
    }

    #[test]
    fn test_overdue_schedule_is_due_now() {
        let profile = ZoneProfile {
            name: "North Field Tomatoes".to_string(),
            band: band(40.0, 60.0),
            last_irrigation: Some(now() - Duration::days(10)),
            interval_hours: 24,
        };
        assert_eq!(evaluate_zone(&profile, 50.0, now()).next_irrigation, Some(now()));

        let never = ZoneProfile {
            last_irrigation: None,
            ..profile
        };
        assert_eq!(evaluate_zone(&never, 50.0, now()).next_irrigation, Some(now()));
    }

    #[test]
    fn test_usage_summary_rollup() {
        let records = vec![
            // Today
            record(now() - Duration::hours(2), None, 100.0),
            record(now() - Duration::hours(10), Some("north"), 24.0),
            // Earlier this week
            record(now() - Duration::days(3), None, 752.0),
            // Previous week
            record(now() - Duration::days(9), None, 995.0),
            // Too old, and in the future
            record(now() - Duration::days(20), None, 5000.0),
            record(now() + Duration::hours(1), None, 5000.0),
        ];

        let summary = usage_summary(&records, now());
        assert_eq!(summary.today_gallons, 124.0);
        assert_eq!(summary.weekly_gallons, 876.0);
        assert_eq!(summary.savings_percent, 12.0);
    }

    #[test]
    fn test_usage_summary_without_history() {
        let summary = usage_summary(&[], now());
        assert_eq!(summary.today_gallons, 0.0);
        assert_eq!(summary.weekly_gallons, 0.0);
        assert_eq!(summary.savings_percent, 0.0);
    }
}
