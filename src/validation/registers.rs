//! Register-mapping validation: field checks, byte-range address conflicts and bit-field
//! overlaps.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::LazyLock;

use super::issue::{ValidationIssue, ValidationResult};
use super::steps::StepValidator;

static REGISTER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("static regex"));

const REQUIRED_FIELDS: [&str; 4] = ["name", "address", "size", "access"];
const VALID_SIZES: [u32; 3] = [8, 16, 32];
const RESERVED_NAMES: [&str; 3] = ["RESERVED", "RES", "RSVD"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    WriteOneToClear,
    WriteOneToSet,
    ReadToClear,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::ReadOnly => "RO",
            Access::WriteOnly => "WO",
            Access::ReadWrite => "RW",
            Access::WriteOneToClear => "W1C",
            Access::WriteOneToSet => "W1S",
            Access::ReadToClear => "RC",
        }
    }
}

impl FromStr for Access {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RO" => Ok(Access::ReadOnly),
            "WO" => Ok(Access::WriteOnly),
            "RW" => Ok(Access::ReadWrite),
            "W1C" => Ok(Access::WriteOneToClear),
            "W1S" => Ok(Access::WriteOneToSet),
            "RC" => Ok(Access::ReadToClear),
            other => Err(other.to_string()),
        }
    }
}

/// A register entry that passed structural checks. Exists only during validation.
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    pub name: String,
    /// Byte offset.
    pub address: u64,
    /// Width in bits.
    pub size: u32,
    pub access: String,
    pub reset_value: Option<u64>,
    pub bit_fields: Vec<Value>,
    pub description: Option<String>,
}

impl RegisterInfo {
    /// Occupied bytes: `[address, address + size/8 - 1]`.
    pub fn byte_range(&self) -> RangeInclusive<u64> {
        let bytes = u64::from(self.size / 8).max(1);
        self.address..=self.address.saturating_add(bytes - 1)
    }
}

/// Parse an integer literal the way register maps spell them: `0x1F`, `0b101`, `0o17`, `42`,
/// or a plain JSON number. Underscores are ignored.
pub fn parse_int_literal(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => parse_int_str(s),
        _ => None,
    }
}

fn parse_int_str(raw: &str) -> Option<i128> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '_').collect();
    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    let lower = body.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i128::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i128::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i128::from_str_radix(oct, 8).ok()
    } else if lower.len() > 1 && lower.starts_with('0') && lower.chars().any(|c| c != '0') {
        // Leading zeros are not a valid decimal literal in base-prefix notation.
        None
    } else {
        lower.parse::<i128>().ok()
    }?;
    Some(if negative { -parsed } else { parsed })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct RegisterMappingValidator;

impl StepValidator for RegisterMappingValidator {
    fn validate_custom(&self, data: &Value, result: &mut ValidationResult) {
        let Some(registers) = data.as_object().and_then(|obj| obj.get("registers")) else {
            result.add_issue(ValidationIssue::error(
                "Register mapping must contain 'registers' field",
            ));
            return;
        };
        let Some(registers) = registers.as_array() else {
            result.add_issue(ValidationIssue::error("Registers must be a list"));
            return;
        };

        let mut address_map: HashMap<u64, usize> = HashMap::new();
        let mut mapped: Vec<RegisterInfo> = Vec::new();

        for (idx, register) in registers.iter().enumerate() {
            let Some(info) = validate_single_register(register, idx, result) else {
                continue;
            };
            if check_address_conflicts(&info, &mapped, &address_map, result) {
                for addr in info.byte_range() {
                    address_map.insert(addr, mapped.len());
                }
            }
            if !info.bit_fields.is_empty() {
                validate_bit_fields(&info, result);
            }
            mapped.push(info);
        }
    }
}

fn validate_single_register(
    register: &Value,
    idx: usize,
    result: &mut ValidationResult,
) -> Option<RegisterInfo> {
    let location = format!("registers[{idx}]");

    let Some(obj) = register.as_object() else {
        result.add_issue(ValidationIssue::error("Register entry must be an object").at(location));
        return None;
    };

    for field in REQUIRED_FIELDS {
        if !obj.contains_key(field) {
            result.add_issue(
                ValidationIssue::error(format!("Register missing required field: {field}"))
                    .at(&location)
                    .field(field),
            );
            return None;
        }
    }

    let name = display_value(&obj["name"]);
    if !REGISTER_NAME.is_match(&name) {
        result.add_issue(
            ValidationIssue::warning(format!(
                "Register name '{name}' doesn't follow naming convention"
            ))
            .at(&location)
            .suggest("Use UPPER_SNAKE_CASE for register names"),
        );
    }

    let address = match parse_int_literal(&obj["address"]).and_then(|a| u64::try_from(a).ok()) {
        Some(address) => address,
        None => {
            result.add_issue(
                ValidationIssue::error(format!("Invalid address format for register {name}"))
                    .at(&location)
                    .field("address"),
            );
            return None;
        }
    };

    let size = obj["size"]
        .as_u64()
        .and_then(|s| u32::try_from(s).ok())
        .filter(|s| VALID_SIZES.contains(s));
    let Some(size) = size else {
        result.add_issue(
            ValidationIssue::error(format!(
                "Invalid register size {} for {name}",
                display_value(&obj["size"])
            ))
            .at(&location)
            .field("size")
            .suggest("Use 8, 16, or 32 bit register size"),
        );
        return None;
    };

    if address.checked_add(u64::from(size / 8) - 1).is_none() {
        result.add_issue(
            ValidationIssue::error(format!(
                "Register {name} extends past the end of the address space"
            ))
            .at(&location)
            .field("address"),
        );
        return None;
    }

    let access = display_value(&obj["access"]).to_uppercase();
    if !obj["access"].is_string() || access.parse::<Access>().is_err() {
        result.add_issue(
            ValidationIssue::error(format!("Invalid access permission '{access}' for {name}"))
                .at(&location)
                .field("access")
                .suggest("Use RO, WO, RW, W1C, W1S, or RC"),
        );
    }

    let mut reset_value = None;
    if let Some(raw) = obj.get("reset_value").filter(|v| !v.is_null()) {
        match parse_int_literal(raw) {
            Some(value) => {
                let max_value = (1i128 << size) - 1;
                if !(0..=max_value).contains(&value) {
                    result.add_issue(
                        ValidationIssue::error(format!(
                            "Reset value {} exceeds {size}-bit range for {name}",
                            display_value(raw)
                        ))
                        .at(&location)
                        .field("reset_value")
                        .suggest(format!("Use value between 0x0 and 0x{max_value:X}")),
                    );
                }
                reset_value = u64::try_from(value).ok();
            }
            None => {
                result.add_issue(
                    ValidationIssue::warning(format!("Invalid reset value format for {name}"))
                        .at(&location)
                        .field("reset_value"),
                );
            }
        }
    }

    let bit_fields = obj
        .get("bit_fields")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Some(RegisterInfo {
        name,
        address,
        size,
        access,
        reset_value,
        bit_fields,
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Returns true when the register's bytes are free and may be claimed.
fn check_address_conflicts(
    info: &RegisterInfo,
    mapped: &[RegisterInfo],
    address_map: &HashMap<u64, usize>,
    result: &mut ValidationResult,
) -> bool {
    for addr in info.byte_range() {
        if let Some(owner) = address_map.get(&addr).map(|&i| &mapped[i]) {
            result.add_issue(
                ValidationIssue::error(format!(
                    "Register '{}' at 0x{:X} conflicts with '{}' at 0x{:X}",
                    info.name, info.address, owner.name, owner.address
                ))
                .field("address")
                .suggest("Adjust register addresses to avoid overlap"),
            );
            return false;
        }
    }
    true
}

fn bit_position(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn validate_bit_fields(info: &RegisterInfo, result: &mut ValidationResult) {
    let width = info.size as usize;
    let mut bit_usage = vec![false; width];

    for (idx, field) in info.bit_fields.iter().enumerate() {
        let location = format!("{}.bit_fields[{idx}]", info.name);

        let Some(obj) = field.as_object() else {
            result.add_issue(ValidationIssue::error("Bit field must be an object").at(location));
            continue;
        };

        if !(obj.contains_key("name") && obj.contains_key("start_bit") && obj.contains_key("end_bit"))
        {
            result.add_issue(
                ValidationIssue::error("Bit field missing required fields")
                    .at(location)
                    .suggest("Add 'name', 'start_bit', and 'end_bit'"),
            );
            continue;
        }

        let name = display_value(&obj["name"]);
        let (Some(start_bit), Some(end_bit)) =
            (bit_position(&obj["start_bit"]), bit_position(&obj["end_bit"]))
        else {
            result.add_issue(
                ValidationIssue::error(format!("Invalid bit positions for field {name}"))
                    .at(location),
            );
            continue;
        };

        if start_bit < 0 || end_bit >= width as i64 {
            result.add_issue(
                ValidationIssue::error(format!("Bit field {name} exceeds register size"))
                    .at(location)
                    .suggest(format!("Use bits 0-{}", width - 1)),
            );
            continue;
        }

        if start_bit > end_bit {
            result.add_issue(
                ValidationIssue::error(format!(
                    "Invalid bit range for field {name}: {start_bit}-{end_bit}"
                ))
                .at(location)
                .suggest("start_bit must be <= end_bit"),
            );
            continue;
        }

        for bit in start_bit as usize..=end_bit as usize {
            if bit_usage[bit] {
                result.add_issue(
                    ValidationIssue::error(format!(
                        "Bit field {name} overlaps with another field at bit {bit}"
                    ))
                    .at(&location)
                    .suggest("Adjust bit field ranges to avoid overlap"),
                );
                break;
            }
            bit_usage[bit] = true;
        }

        if RESERVED_NAMES.contains(&name.to_uppercase().as_str()) {
            let access = obj
                .get("access")
                .map(display_value)
                .unwrap_or_else(|| "RO".to_string());
            if access.to_uppercase() != "RO" {
                result.add_issue(
                    ValidationIssue::warning(format!("Reserved field {name} should be read-only"))
                        .at(&location)
                        .suggest("Set access to 'RO' for reserved fields"),
                );
            }
        }
    }
}
