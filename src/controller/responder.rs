//! The LX200 command surface: translates protocol verbs into controller
//! calls and formats the replies.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::controller::MountController;
use crate::coords::{format_dec, format_ra, parse_sexagesimal, radec_from_lx200};
use crate::environment::Environment;
use crate::errors::{MountError, Result};

const DEFAULT_REPLY: &str = "1";
const SLEW_POSSIBLE: &str = "0";
const SYNC_REPLY: &str = "Sync complete";
// The SC reply carries two fixed 30-character status lines.
const UPDATING_PLANETARY_DATA1: &str = "Updating Planetary Data       ";
const UPDATING_PLANETARY_DATA2: &str = "                              ";

const TELESCOPE_NAME: &str = "AltAz Mount";
const FIRMWARE_NUMBER: &str = "1.0";
const FIRMWARE_DATE: &str = "Jun 01 2023";
const FIRMWARE_TIME: &str = "18:00:00";

/// Every verb the mount implements, longest first so prefix matching picks
/// the most specific one. `Q` stays last of its family: the directional
/// stops are aliases for the same stop.
const VERBS: [&str; 38] = [
    "GVD", "GVF", "GVN", "GVP", "GVT", "CM", "GC", "Gc", "GD", "GG", "Gg", "GL", "GM", "GR",
    "GT", "Gt", "MS", "Me", "Mn", "Ms", "Mw", "Qe", "Qn", "Qs", "Qw", "RC", "RG", "RM", "RS",
    "SC", "Sd", "SG", "Sg", "SL", "Sr", "St", "Q", "U",
];

/// How a reply goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing is written.
    None,
    /// Written as-is, no terminator. Single-digit booleans.
    Bare(String),
    /// Written with a trailing `#`.
    Terminated(String),
    /// Parts written in order with a short pause between them.
    Sequence(Vec<Reply>),
}

impl Reply {
    fn bare(value: impl Into<String>) -> Self {
        Reply::Bare(value.into())
    }

    fn terminated(value: impl Into<String>) -> Self {
        Reply::Terminated(value.into())
    }
}

#[derive(Debug)]
struct TargetState {
    ra: String,
    dec: String,
    /// Local time from `SL`, waiting for the `SC` date to complete it.
    pending_local_time: Option<NaiveTime>,
}

pub struct CommandResponder {
    controller: Arc<MountController>,
    env: Environment,
    target: Mutex<TargetState>,
}

impl CommandResponder {
    pub fn new(controller: Arc<MountController>, env: Environment) -> Self {
        CommandResponder {
            controller,
            env,
            target: Mutex::new(TargetState {
                ra: "00:00:00".to_string(),
                dec: "+00*00:00".to_string(),
                pending_local_time: None,
            }),
        }
    }

    /// Handle one framed command (the text between `:` and `#`). Unknown
    /// verbs are logged and produce no reply.
    pub async fn process_command(&self, line: &str) -> Result<Reply> {
        let Some((verb, data)) = split_verb(line) else {
            warn!("Unknown command {line:?}.");
            return Ok(Reply::None);
        };
        if verb != "GR" && verb != "GD" {
            debug!("Processing command {line:?}.");
        }

        match verb {
            "CM" => self.sync().await,
            "Gc" => Ok(Reply::terminated("(24)")),
            "GC" => Ok(Reply::terminated(
                self.env.clock().now().format("%m/%d/%y").to_string(),
            )),
            "GD" => self.get_dec().await,
            "Gg" => self.get_site_longitude(),
            "GG" => self.get_utc_offset(),
            "GL" => Ok(Reply::terminated(
                self.env.clock().now().format("%H:%M:%S").to_string(),
            )),
            "GM" => Ok(Reply::terminated(self.env.location().name)),
            "GR" => self.get_ra().await,
            "Gt" => self.get_site_latitude(),
            "GT" => Ok(Reply::terminated("60.0")),
            "GVD" => Ok(Reply::terminated(FIRMWARE_DATE)),
            "GVF" => Ok(Reply::terminated(format!(
                "{TELESCOPE_NAME}|A|{FIRMWARE_NUMBER}|{FIRMWARE_DATE}@{FIRMWARE_TIME}"
            ))),
            "GVN" => Ok(Reply::terminated(FIRMWARE_NUMBER)),
            "GVP" => Ok(Reply::terminated(TELESCOPE_NAME)),
            "GVT" => Ok(Reply::terminated(FIRMWARE_TIME)),
            "MS" => self.move_slew().await,
            "Mn" | "Me" | "Ms" | "Mw" => {
                self.controller.slew_in_direction(verb).await?;
                Ok(Reply::bare(SLEW_POSSIBLE))
            }
            "Q" | "Qn" | "Qe" | "Qs" | "Qw" => {
                self.controller.stop_slew().await?;
                Ok(Reply::None)
            }
            "RC" | "RG" | "RM" | "RS" => {
                self.controller.set_slew_rate(verb).await?;
                Ok(Reply::None)
            }
            "SC" => self.set_local_date(data).await,
            "Sd" => self.set_target_dec(data).await,
            "Sg" => self.set_site_longitude(data),
            "SG" => self.set_utc_offset(data),
            "SL" => self.set_local_time(data).await,
            "Sr" => self.set_target_ra(data).await,
            "St" => self.set_site_latitude(data),
            "U" => Ok(Reply::None),
            other => {
                warn!("Command {other:?} recognized but not dispatched.");
                Ok(Reply::None)
            }
        }
    }

    async fn get_ra(&self) -> Result<Reply> {
        let ra_dec = self.controller.get_ra_dec().await;
        Ok(Reply::terminated(format_ra(ra_dec.ra)))
    }

    async fn get_dec(&self) -> Result<Reply> {
        let ra_dec = self.controller.get_ra_dec().await;
        Ok(Reply::terminated(format_dec(ra_dec.dec)))
    }

    async fn set_target_ra(&self, data: &str) -> Result<Reply> {
        debug!("Setting target RA to {data:?}.");
        self.target.lock().await.ra = data.to_string();
        Ok(Reply::bare(DEFAULT_REPLY))
    }

    async fn set_target_dec(&self, data: &str) -> Result<Reply> {
        debug!("Setting target DEC to {data:?}.");
        self.target.lock().await.dec = data.to_string();
        Ok(Reply::bare(DEFAULT_REPLY))
    }

    /// `MS`: slew to the stored target.
    async fn move_slew(&self) -> Result<Reply> {
        let (ra, dec) = {
            let target = self.target.lock().await;
            (target.ra.clone(), target.dec.clone())
        };
        debug!("Slewing to RaDec ({ra}, {dec}).");
        let slew_possible = self.controller.slew_to(&ra, &dec).await?;
        Ok(Reply::bare(slew_possible))
    }

    /// `CM`: adopt the stored target as the current pointing and record an
    /// alignment pair.
    async fn sync(&self) -> Result<Reply> {
        let ra_dec = {
            let target = self.target.lock().await;
            radec_from_lx200(&target.ra, &target.dec)?
        };
        self.controller.set_ra_dec(ra_dec).await;
        Ok(Reply::terminated(SYNC_REPLY))
    }

    /// The LX200 longitude convention is west-positive, opposite to the
    /// internal east-positive one.
    fn get_site_longitude(&self) -> Result<Reply> {
        Ok(Reply::terminated(format_dm(
            -self.env.location().longitude,
            3,
        )))
    }

    fn set_site_longitude(&self, data: &str) -> Result<Reply> {
        let longitude = parse_sexagesimal(data)?;
        self.env.set_longitude(-longitude);
        debug!(lx200 = data, internal = -longitude, "Longitude set.");
        Ok(Reply::bare(DEFAULT_REPLY))
    }

    fn get_site_latitude(&self) -> Result<Reply> {
        Ok(Reply::terminated(format_dm(self.env.location().latitude, 2)))
    }

    fn set_site_latitude(&self, data: &str) -> Result<Reply> {
        let latitude = parse_sexagesimal(data)?;
        self.env.set_latitude(latitude);
        Ok(Reply::bare(DEFAULT_REPLY))
    }

    /// The LX200 offset counts the hours to add to local time to reach
    /// UTC, the negation of the stored east-positive offset.
    fn get_utc_offset(&self) -> Result<Reply> {
        let offset = self.env.clock().utc_offset_hours();
        Ok(Reply::terminated(format!("{:.1}", -offset)))
    }

    fn set_utc_offset(&self, data: &str) -> Result<Reply> {
        let hours: f64 = data.trim().parse().map_err(|_| {
            MountError::invalid_argument(format!("cannot parse UTC offset {data:?}"))
        })?;
        self.env.clock().set_utc_offset(-hours);
        Ok(Reply::bare(DEFAULT_REPLY))
    }

    async fn set_local_time(&self, data: &str) -> Result<Reply> {
        let time = NaiveTime::parse_from_str(data.trim(), "%H:%M:%S").map_err(|_| {
            MountError::invalid_argument(format!("cannot parse local time {data:?}"))
        })?;
        self.target.lock().await.pending_local_time = Some(time);
        Ok(Reply::bare(DEFAULT_REPLY))
    }

    /// `SC`: combine the date with the pending `SL` time and shift the
    /// clock. The reply is the acknowledgement plus two status lines.
    async fn set_local_date(&self, data: &str) -> Result<Reply> {
        let date = NaiveDate::parse_from_str(data.trim(), "%m/%d/%y").map_err(|_| {
            MountError::invalid_argument(format!("cannot parse local date {data:?}"))
        })?;
        let time = self
            .target
            .lock()
            .await
            .pending_local_time
            .take()
            .unwrap_or_else(|| self.env.clock().now().time());

        let clock = self.env.clock();
        let offset = chrono::FixedOffset::east_opt(
            (clock.utc_offset_hours() * 3600.0) as i32,
        )
        .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).unwrap());
        let datetime = date
            .and_time(time)
            .and_local_timezone(offset)
            .single()
            .ok_or_else(|| {
                MountError::invalid_argument(format!("invalid local date {data:?}"))
            })?;
        clock.set_datetime(datetime);
        debug!(%datetime, "Clock set from the planetarium software.");

        Ok(Reply::Sequence(vec![
            Reply::bare(DEFAULT_REPLY),
            Reply::terminated(UPDATING_PLANETARY_DATA1),
            Reply::terminated(UPDATING_PLANETARY_DATA2),
        ]))
    }
}

/// Split a command line into its verb and argument text.
fn split_verb(line: &str) -> Option<(&str, &str)> {
    VERBS
        .iter()
        .find(|verb| line.starts_with(**verb))
        .map(|verb| (*verb, &line[verb.len()..]))
}

/// Format an angle as the LX200 `sDDD*MM` style string. `degree_width` is
/// the zero-padded width of the degree field.
fn format_dm(value: f64, degree_width: usize) -> String {
    let sign = if value < 0.0 { '-' } else { '+' };
    let total_minutes = (value.abs() * 60.0).round() as u64;
    format!(
        "{sign}{degrees:0degree_width$}*{minutes:02}",
        degrees = total_minutes / 60,
        minutes = total_minutes % 60,
    )
}
