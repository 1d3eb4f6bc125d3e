//! On-disk layout of captured service output.
//!
//! `<log_dir>/<service>/<service> YY-MMDD.log` is the live file. Rotated files
//! get the hour appended (`... YY-MMDD HH.log`, or `HH.MM` on collision).

use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub fn service_log_dir(log_dir: &Path, service: &str) -> PathBuf {
	log_dir.join(service)
}

pub fn current_log_name(service: &str) -> String {
	format!("{} {}.log", service, Local::now().format("%y-%m%d"))
}

pub fn rotated_log_name(service_dir: &Path, service: &str) -> String {
	let now = Local::now();
	let candidate = format!("{} {}.log", service, now.format("%y-%m%d %H"));
	if service_dir.join(&candidate).exists() {
		format!("{} {}.log", service, now.format("%y-%m%d %H.%M"))
	} else {
		candidate
	}
}

/// Date embedded in a log file name, if any.
pub fn parse_log_date(filename: &str) -> Option<NaiveDate> {
	let (_, rest) = filename.split_once(' ')?;
	let date = rest.split(' ').next()?.trim_end_matches(".log");
	NaiveDate::parse_from_str(date, "%y-%m%d").ok()
}

/// Remove logs older than `max_age_days` and keep at most `max_files` per
/// service. Either limit is disabled when zero.
pub fn expire_logs(log_dir: &Path, max_age_days: u32, max_files: u32) {
	let entries = match std::fs::read_dir(log_dir) {
		Ok(e) => e,
		Err(_) => return,
	};

	for entry in entries.flatten() {
		if entry.path().is_dir() {
			expire_service_logs(&entry.path(), max_age_days, max_files);
		}
	}
}

fn expire_service_logs(dir: &Path, max_age_days: u32, max_files: u32) {
	let entries = match std::fs::read_dir(dir) {
		Ok(e) => e,
		Err(_) => return,
	};

	let mut files: Vec<(PathBuf, Option<NaiveDate>)> = entries
		.flatten()
		.map(|e| e.path())
		.filter(|p| p.extension().and_then(|e| e.to_str()) == Some("log"))
		.map(|p| {
			let date = p.file_name().and_then(|n| n.to_str()).and_then(parse_log_date);
			(p, date)
		})
		.collect();

	if max_age_days > 0 {
		let cutoff = Local::now().date_naive() - chrono::Days::new(max_age_days as u64);
		files.retain(|(path, date)| match date {
			Some(d) if *d < cutoff => {
				if let Err(e) = std::fs::remove_file(path) {
					tracing::warn!("failed to expire {}: {}", path.display(), e);
				}
				false
			}
			_ => true,
		});
	}

	if max_files > 0 && files.len() > max_files as usize {
		files.sort_by_key(|(path, _)| modified(path));
		let excess = files.len() - max_files as usize;
		for (path, _) in files.iter().take(excess) {
			let _ = std::fs::remove_file(path);
		}
	}
}

fn modified(path: &Path) -> SystemTime {
	path.metadata()
		.and_then(|m| m.modified())
		.unwrap_or(SystemTime::UNIX_EPOCH)
}
