//! Fade schedule of intermittent watermarks.

use chrono::{DateTime, TimeDelta, Utc};

use crate::catalog::overlay::{FadeDirection, WatermarkFade};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadePoint {
    pub direction: FadeDirection,
    /// Seconds into the item.
    pub time: f64,
}

/// Fade points of a watermark shown for `duration_seconds` at every
/// `frequency_minutes` boundary of the wall clock that falls inside the
/// item starting at `item_start` and lasting `item_length` seconds.
pub fn fade_points(
    item_start: DateTime<Utc>,
    item_length: f64,
    frequency_minutes: u32,
    duration_seconds: u32,
) -> Vec<FadePoint> {
    if frequency_minutes == 0 || !item_length.is_finite() || item_length <= 0.0 {
        return Vec::new();
    }

    let period = i64::from(frequency_minutes) * 60;
    let midnight = item_start
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(item_start);
    let elapsed = (item_start - midnight).num_milliseconds() as f64 / 1000.0;
    let periods = (elapsed / period as f64).ceil() as i64;
    let mut boundary = midnight + TimeDelta::seconds(periods * period);

    let mut points = Vec::new();
    loop {
        let offset = (boundary - item_start).num_milliseconds() as f64 / 1000.0;
        if offset >= item_length {
            break;
        }
        points.push(FadePoint {
            direction: FadeDirection::In,
            time: offset,
        });
        points.push(FadePoint {
            direction: FadeDirection::Out,
            time: offset + f64::from(duration_seconds),
        });
        boundary += TimeDelta::seconds(period);
    }
    points
}

/// Fade filters for `points`. Each fade is enabled from just after the
/// previous one until just after its own start, so consecutive fades
/// never overlap.
pub fn fade_filters(points: &[FadePoint], item_length: f64) -> Vec<WatermarkFade> {
    let mut fades = Vec::with_capacity(points.len());
    for (i, point) in points.iter().enumerate() {
        let (enable_from, enable_until) = match point.direction {
            FadeDirection::In => {
                let from = match i.checked_sub(1).and_then(|p| points.get(p)) {
                    Some(previous) => previous.time + 1.0,
                    None => 0.0,
                };
                (from, point.time + 1.0)
            }
            FadeDirection::Out => {
                let from = match i.checked_sub(1).and_then(|p| points.get(p)) {
                    Some(fade_in) => fade_in.time + 1.0,
                    None => 0.0,
                };
                let until = points
                    .get(i + 1)
                    .map(|next| next.time)
                    .unwrap_or(item_length);
                (from, until)
            }
        };
        fades.push(WatermarkFade {
            direction: point.direction,
            start: point.time,
            enable_from,
            enable_until,
        });
    }
    fades
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::step::PipelineStep;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, hour, minute, second)
            .single()
            .unwrap()
    }

    #[test]
    fn boundaries_follow_the_clock() {
        let points = fade_points(at(20, 58, 0), 1800.0, 15, 30);
        let times: Vec<f64> = points.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![120.0, 150.0, 1020.0, 1050.0]);
        assert_eq!(points[0].direction, FadeDirection::In);
        assert_eq!(points[1].direction, FadeDirection::Out);
    }

    #[test]
    fn start_on_a_boundary_fades_in_immediately() {
        let points = fade_points(at(21, 0, 0), 600.0, 10, 20);
        assert_eq!(points.first().map(|p| p.time), Some(0.0));
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn short_items_may_have_no_window() {
        assert!(fade_points(at(20, 50, 10), 240.0, 15, 30).is_empty());
        assert!(fade_points(at(20, 50, 10), 240.0, 0, 30).is_empty());
    }

    #[test]
    fn enable_windows_do_not_overlap() {
        let points = fade_points(at(20, 58, 0), 1800.0, 15, 30);
        let fades = fade_filters(&points, 1800.0);
        let rendered: Vec<String> = fades.iter().filter_map(|f| f.filter()).collect();
        assert_eq!(
            rendered,
            vec![
                "fade=in:st=120:d=1:alpha=1:enable='between(t,0,121)'",
                "fade=out:st=150:d=1:alpha=1:enable='between(t,121,1020)'",
                "fade=in:st=1020:d=1:alpha=1:enable='between(t,151,1021)'",
                "fade=out:st=1050:d=1:alpha=1:enable='between(t,1021,1800)'",
            ]
        );
    }
}
