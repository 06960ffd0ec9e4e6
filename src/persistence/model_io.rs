use std::{
    io::{BufRead, ErrorKind, Write},
    str::FromStr,
};

use crate::{GdErr, Result};

/// One direction of a model file, binary or text.
///
/// Writers and readers go through the same `rw_*` calls so both sides always
/// agree on the field order.
pub enum ModelIo<'a> {
    Read { rx: &'a mut dyn BufRead, text: bool },
    Write { tx: &'a mut dyn Write, text: bool },
}

impl<'a> ModelIo<'a> {
    pub fn reader(rx: &'a mut dyn BufRead, text: bool) -> Self {
        Self::Read { rx, text }
    }

    pub fn writer(tx: &'a mut dyn Write, text: bool) -> Self {
        Self::Write { tx, text }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }

    /// Reads or writes the flag telling whether the file is a resumable checkpoint.
    pub fn rw_resume_flag(&mut self, resume: &mut bool) -> Result<()> {
        match self {
            Self::Write { tx, text: false } => tx.write_all(&[*resume as u8])?,
            Self::Write { tx, text: true } => writeln!(tx, ":{}", *resume as u8)?,
            Self::Read { rx, text: false } => {
                let mut flag = [0u8; 1];
                rx.read_exact(&mut flag).map_err(truncated)?;
                *resume = flag[0] != 0;
            }
            Self::Read { rx, text: true } => {
                let line = read_line(&mut **rx)?.ok_or(GdErr::CorruptModel {
                    what: "missing resume flag",
                })?;
                *resume = match line.trim_end() {
                    ":0" => false,
                    ":1" => true,
                    _ => {
                        return Err(GdErr::CorruptModel {
                            what: "malformed resume flag",
                        });
                    }
                };
            }
        }

        Ok(())
    }

    pub fn rw_f32(&mut self, label: &str, value: &mut f32) -> Result<()> {
        match self {
            Self::Write { tx, text: false } => tx.write_all(&value.to_ne_bytes())?,
            Self::Write { tx, text: true } => writeln!(tx, "{label} {value:.6}")?,
            Self::Read { rx, text: false } => {
                rx.read_exact(bytemuck::bytes_of_mut(value))
                    .map_err(truncated)?;
            }
            Self::Read { rx, text: true } => *value = read_labeled(&mut **rx, label)?,
        }

        Ok(())
    }

    pub fn rw_f64(&mut self, label: &str, value: &mut f64) -> Result<()> {
        match self {
            Self::Write { tx, text: false } => tx.write_all(&value.to_ne_bytes())?,
            Self::Write { tx, text: true } => writeln!(tx, "{label} {value:.6}")?,
            Self::Read { rx, text: false } => {
                rx.read_exact(bytemuck::bytes_of_mut(value))
                    .map_err(truncated)?;
            }
            Self::Read { rx, text: true } => *value = read_labeled(&mut **rx, label)?,
        }

        Ok(())
    }

    pub fn rw_u64(&mut self, label: &str, value: &mut u64) -> Result<()> {
        match self {
            Self::Write { tx, text: false } => tx.write_all(&value.to_ne_bytes())?,
            Self::Write { tx, text: true } => writeln!(tx, "{label} {value}")?,
            Self::Read { rx, text: false } => {
                rx.read_exact(bytemuck::bytes_of_mut(value))
                    .map_err(truncated)?;
            }
            Self::Read { rx, text: true } => *value = read_labeled(&mut **rx, label)?,
        }

        Ok(())
    }

    /// Writes one weight table entry: its index followed by `slots`.
    ///
    /// # Returns
    /// An error if this is a reading `ModelIo` or the sink fails.
    pub fn write_entry(&mut self, index: u32, slots: &[f32]) -> Result<()> {
        match self {
            Self::Write { tx, text: false } => {
                tx.write_all(bytemuck::bytes_of(&index))?;
                tx.write_all(bytemuck::cast_slice(slots))?;
            }
            Self::Write { tx, text: true } => {
                write!(tx, "{index}")?;
                for (i, slot) in slots.iter().enumerate() {
                    let sep = if i == 0 { ':' } else { ' ' };
                    write!(tx, "{sep}{slot:.6}")?;
                }
                tx.write_all(b"\n")?;
            }
            Self::Read { .. } => return Err(wrong_direction()),
        }

        Ok(())
    }

    /// Reads one weight table entry into `slots`.
    ///
    /// # Returns
    /// The entry's index, or `None` once the input is exhausted.
    pub fn read_entry(&mut self, slots: &mut [f32]) -> Result<Option<u32>> {
        match self {
            Self::Read { rx, text: false } => {
                if rx.fill_buf()?.is_empty() {
                    return Ok(None);
                }

                let mut index = 0u32;
                rx.read_exact(bytemuck::bytes_of_mut(&mut index))
                    .map_err(truncated)?;
                rx.read_exact(bytemuck::cast_slice_mut(slots))
                    .map_err(truncated)?;
                Ok(Some(index))
            }
            Self::Read { rx, text: true } => loop {
                let Some(line) = read_line(&mut **rx)? else {
                    return Ok(None);
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                return parse_entry(line, slots).map(Some);
            },
            Self::Write { .. } => Err(wrong_direction()),
        }
    }

    /// Writes a `name:weight` line of an inverted hash model.
    pub fn write_named(&mut self, name: &str, weight: f32) -> Result<()> {
        match self {
            Self::Write { tx, .. } => {
                writeln!(tx, "{name}:{weight:.6}")?;
                Ok(())
            }
            Self::Read { .. } => Err(wrong_direction()),
        }
    }
}

fn truncated(e: std::io::Error) -> GdErr {
    if e.kind() == ErrorKind::UnexpectedEof {
        GdErr::CorruptModel {
            what: "file ends in the middle of a field",
        }
    } else {
        GdErr::Io(e)
    }
}

fn wrong_direction() -> GdErr {
    GdErr::Io(std::io::Error::new(
        ErrorKind::Unsupported,
        "model stream opened in the other direction",
    ))
}

fn read_line(rx: &mut dyn BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    if rx.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn read_labeled<T: FromStr>(rx: &mut dyn BufRead, label: &str) -> Result<T> {
    let line = read_line(rx)?.ok_or(GdErr::CorruptModel {
        what: "missing online state field",
    })?;

    line.trim_end()
        .strip_prefix(label)
        .and_then(|rest| rest.strip_prefix(' '))
        .and_then(|value| value.parse().ok())
        .ok_or(GdErr::CorruptModel {
            what: "malformed online state field",
        })
}

fn parse_entry(line: &str, slots: &mut [f32]) -> Result<u32> {
    let malformed = GdErr::CorruptModel {
        what: "malformed weight entry",
    };

    let Some((index, values)) = line.split_once(':') else {
        return Err(malformed);
    };
    let Ok(index) = index.parse() else {
        return Err(malformed);
    };

    let mut values = values.split_whitespace();
    for slot in slots.iter_mut() {
        match values.next().map(str::parse) {
            Some(Ok(v)) => *slot = v,
            _ => return Err(malformed),
        }
    }

    if values.next().is_some() {
        return Err(malformed);
    }

    Ok(index)
}
