//! Validation of five-field cron schedules.

use crate::error::SdkError;

const MONTHS: [&str; 12] = [
  "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

struct Field {
  name: &'static str,
  min: u32,
  max: u32,
  names: &'static [&'static str],
  /// Value of the first name.
  first_name: u32,
}

const FIELDS: [Field; 5] = [
  Field {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    first_name: 0,
  },
  Field {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    first_name: 0,
  },
  Field {
    name: "day of month",
    min: 1,
    max: 31,
    names: &[],
    first_name: 0,
  },
  Field {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTHS,
    first_name: 1,
  },
  // 7 is accepted as Sunday.
  Field {
    name: "day of week",
    min: 0,
    max: 7,
    names: &WEEKDAYS,
    first_name: 0,
  },
];

/// Check that `expr` is a standard five-field cron expression.
pub fn validate_cron(expr: &str) -> Result<(), SdkError> {
  let parts: Vec<&str> = expr.split_whitespace().collect();
  if parts.len() != FIELDS.len() {
    return Err(SdkError::user_argument(format!(
      "invalid cron schedule `{}`: expected 5 fields, found {}",
      expr,
      parts.len()
    )));
  }
  for (part, field) in parts.iter().zip(FIELDS.iter()) {
    for item in part.split(',') {
      validate_item(item, field).map_err(|reason| {
        SdkError::user_argument(format!(
          "invalid cron schedule `{}`: {} field `{}` {}",
          expr, field.name, part, reason
        ))
      })?;
    }
  }
  Ok(())
}

fn validate_item(item: &str, field: &Field) -> Result<(), String> {
  let (range, step) = match item.split_once('/') {
    Some((range, step)) => (range, Some(step)),
    None => (item, None),
  };

  if let Some(step) = step {
    let step: u32 = step
      .parse()
      .map_err(|_| format!("has an invalid step `{}`", step))?;
    if step == 0 {
      return Err("has a zero step".to_string());
    }
  }

  if range == "*" {
    return Ok(());
  }

  match range.split_once('-') {
    Some((start, end)) => {
      let start = value(start, field)?;
      let end = value(end, field)?;
      if start > end {
        return Err(format!("has a reversed range `{}`", range));
      }
      Ok(())
    }
    None if step.is_some() => Err("uses a step without a range".to_string()),
    None => value(range, field).map(|_| ()),
  }
}

fn value(token: &str, field: &Field) -> Result<u32, String> {
  let lower = token.to_ascii_lowercase();
  if let Some(index) = field.names.iter().position(|name| *name == lower) {
    return Ok(field.first_name + index as u32);
  }
  let n: u32 = token
    .parse()
    .map_err(|_| format!("has an invalid value `{}`", token))?;
  if n < field.min || n > field.max {
    return Err(format!(
      "value {} is outside {}-{}",
      n, field.min, field.max
    ));
  }
  Ok(n)
}
