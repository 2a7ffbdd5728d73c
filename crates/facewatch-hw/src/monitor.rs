//! Monitor geometry from `xrandr --listmonitors`.

use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("failed to run xrandr: {0}")]
    Query(#[from] std::io::Error),
    #[error("xrandr failed: {0}")]
    QueryFailed(String),
    #[error("monitor index {index} out of range ({available} monitors detected)")]
    IndexOutOfRange { index: usize, available: usize },
}

/// A physical display: origin in the virtual screen plus resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Parse `xrandr --listmonitors` output.
///
/// ```text
/// Monitors: 2
///  0: +*eDP-1 1920/344x1080/194+0+0  eDP-1
///  1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1
/// ```
///
/// Lines that do not match are skipped.
pub fn parse_xrandr_monitors(output: &str) -> Vec<Monitor> {
    output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Monitor> {
    let mut fields = line.split_whitespace();
    fields.next()?.strip_suffix(':')?.parse::<usize>().ok()?;
    let name = fields.next()?.trim_start_matches(['+', '*']).to_string();
    let geometry = fields.next()?;

    // WIDTH/MMxHEIGHT/MM+X+Y, offsets may be negative.
    let (width, rest) = geometry.split_once('/')?;
    let (_, rest) = rest.split_once('x')?;
    let (height, offsets) = rest.split_once('/')?;
    let offsets = offsets.trim_start_matches(|c: char| c.is_ascii_digit());
    let (x, y) = parse_offsets(offsets)?;

    Some(Monitor {
        name,
        x,
        y,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
    })
}

/// `+X+Y` where either value may be negative (`+-1280+0`, `-1280-200`).
fn parse_offsets(s: &str) -> Option<(i32, i32)> {
    let s = s.strip_prefix('+').unwrap_or(s);
    let split = s.get(1..)?.find(['+', '-'])? + 1;
    let (x, y) = s.split_at(split);
    let y = y.strip_prefix('+').unwrap_or(y);
    Some((x.parse().ok()?, y.parse().ok()?))
}

/// Query the X server for connected monitors.
pub fn list_monitors() -> Result<Vec<Monitor>, MonitorError> {
    let output = Command::new("xrandr").arg("--listmonitors").output()?;
    if !output.status.success() {
        return Err(MonitorError::QueryFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    let monitors = parse_xrandr_monitors(&String::from_utf8_lossy(&output.stdout));
    tracing::debug!(count = monitors.len(), "queried monitors");
    Ok(monitors)
}

/// Pick monitor `index`, failing when it does not exist.
pub fn select_monitor(monitors: &[Monitor], index: usize) -> Result<Monitor, MonitorError> {
    monitors
        .get(index)
        .cloned()
        .ok_or(MonitorError::IndexOutOfRange {
            index,
            available: monitors.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MONITORS: &str = "Monitors: 2\n \
        0: +*eDP-1 1920/344x1080/194+0+0  eDP-1\n \
        1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1\n";

    #[test]
    fn test_parse_two_monitors() {
        let monitors = parse_xrandr_monitors(TWO_MONITORS);
        assert_eq!(monitors.len(), 2);
        assert_eq!(
            monitors[0],
            Monitor { name: "eDP-1".into(), x: 0, y: 0, width: 1920, height: 1080 }
        );
        assert_eq!(
            monitors[1],
            Monitor { name: "HDMI-1".into(), x: 1920, y: 0, width: 2560, height: 1440 }
        );
    }

    #[test]
    fn test_parse_negative_offsets() {
        let monitors = parse_xrandr_monitors(" 0: +DP-2 1280/300x1024/240-1280+-200  DP-2");
        assert_eq!(monitors[0].x, -1280);
        assert_eq!(monitors[0].y, -200);
        let monitors = parse_xrandr_monitors(" 0: +DP-2 1280/300x1024/240+0-200  DP-2");
        assert_eq!((monitors[0].x, monitors[0].y), (0, -200));
        let monitors = parse_xrandr_monitors(" 0: +DP-2 1280/300x1024/240+-1280+0  DP-2");
        assert_eq!((monitors[0].x, monitors[0].y), (-1280, 0));
    }

    #[test]
    fn test_parse_skips_garbage() {
        assert!(parse_xrandr_monitors("").is_empty());
        assert!(parse_xrandr_monitors("Monitors: 0\nno monitors here").is_empty());
        assert!(parse_xrandr_monitors(" 0: +eDP-1 bogus eDP-1").is_empty());
        assert!(parse_xrandr_monitors(" 0: +eDP-1 1920/344x1080/194  eDP-1").is_empty());
    }

    #[test]
    fn test_select_monitor() {
        let monitors = parse_xrandr_monitors(TWO_MONITORS);
        assert_eq!(select_monitor(&monitors, 1).unwrap().name, "HDMI-1");
        let err = select_monitor(&monitors, 2).unwrap_err();
        assert!(matches!(err, MonitorError::IndexOutOfRange { index: 2, available: 2 }));
    }
}
