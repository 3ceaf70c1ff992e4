//! Spreadsheet report: organization and account sections with subtotals.

use crate::models::{Flow, ReportRow};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use service_core::error::AppError;

const COLUMNS: u16 = 3;
const INCOMING_COLOR: u32 = 0x008000;
const OUTGOING_COLOR: u32 = 0xC00000;

/// One spreadsheet row, before any styling.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetLine {
    OrganizationHeader(String),
    AccountHeader(String),
    ColumnHeader,
    Entry {
        datetime: String,
        amount: Decimal,
        comment: String,
        flow: Flow,
    },
    AccountTotal {
        label: String,
        amount: Decimal,
    },
    OrganizationTotal {
        label: String,
        amount: Decimal,
    },
    Blank,
}

#[derive(Default)]
struct Totals {
    incoming: Decimal,
    outgoing: Decimal,
}

impl Totals {
    fn add(&mut self, flow: Flow, amount: Decimal) {
        match flow {
            Flow::Incoming => self.incoming += amount,
            Flow::Outgoing => self.outgoing += amount,
        }
    }

    /// Incoming is always listed, outgoing only when there was any.
    fn lines(&self, label: &str, line: fn(String, Decimal) -> SheetLine) -> Vec<SheetLine> {
        let mut out = vec![line(format!("{} — incoming", label), self.incoming)];
        if !self.outgoing.is_zero() {
            out.push(line(format!("{} — outgoing", label), self.outgoing));
        }
        out
    }
}

fn account_total(label: String, amount: Decimal) -> SheetLine {
    SheetLine::AccountTotal { label, amount }
}

fn organization_total(label: String, amount: Decimal) -> SheetLine {
    SheetLine::OrganizationTotal { label, amount }
}

/// Lays out rows already ordered by organization, account and time.
pub fn layout(rows: &[ReportRow]) -> Vec<SheetLine> {
    let mut lines = Vec::new();
    let mut org: Option<(i64, &str)> = None;
    let mut account: Option<(i64, &str)> = None;
    let mut org_totals = Totals::default();
    let mut account_totals = Totals::default();

    let close_account = |lines: &mut Vec<SheetLine>, name: &str, totals: &Totals| {
        lines.extend(totals.lines(&format!("Total for account {}", name), account_total));
        lines.push(SheetLine::Blank);
    };
    let close_org = |lines: &mut Vec<SheetLine>, name: &str, totals: &Totals| {
        lines.extend(totals.lines(&format!("Total for {}", name), organization_total));
        lines.push(SheetLine::Blank);
        lines.push(SheetLine::Blank);
    };

    for row in rows {
        if org.map(|(id, _)| id) != Some(row.organization_id) {
            if let Some((_, name)) = account.take() {
                close_account(&mut lines, name, &account_totals);
                account_totals = Totals::default();
            }
            if let Some((_, name)) = org {
                close_org(&mut lines, name, &org_totals);
                org_totals = Totals::default();
            }
            org = Some((row.organization_id, &row.organization_name));
            lines.push(SheetLine::OrganizationHeader(row.organization_name.clone()));
            lines.push(SheetLine::Blank);
        }

        if account.map(|(id, _)| id) != Some(row.account_id) {
            if let Some((_, name)) = account {
                close_account(&mut lines, name, &account_totals);
                account_totals = Totals::default();
            }
            account = Some((row.account_id, &row.account_name));
            let header = if row.account_flow_label.is_empty() {
                row.account_name.clone()
            } else {
                format!("{} — {}", row.account_name, row.account_flow_label)
            };
            lines.push(SheetLine::AccountHeader(header));
            lines.push(SheetLine::ColumnHeader);
        }

        lines.push(SheetLine::Entry {
            datetime: row.datetime.clone(),
            amount: row.amount,
            comment: row.comment.clone(),
            flow: row.flow,
        });
        account_totals.add(row.flow, row.amount);
        org_totals.add(row.flow, row.amount);
    }

    if let Some((_, name)) = account {
        close_account(&mut lines, name, &account_totals);
    }
    if let Some((_, name)) = org {
        close_org(&mut lines, name, &org_totals);
    }
    lines
}

fn xlsx_err(e: XlsxError) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Failed to build spreadsheet: {}", e))
}

fn to_f64(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or_default()
}

/// Renders the report workbook to bytes.
pub fn write_xlsx(rows: &[ReportRow]) -> Result<Vec<u8>, AppError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Statement").map_err(xlsx_err)?;

    let org_header = Format::new()
        .set_bold()
        .set_font_size(14)
        .set_align(FormatAlign::Center);
    let account_header = Format::new()
        .set_bold()
        .set_font_size(12)
        .set_align(FormatAlign::Left);
    let bold = Format::new().set_bold();
    let org_total_text = Format::new().set_bold().set_font_size(12);
    let account_total_amount = Format::new().set_bold().set_num_format("0.00");
    let org_total_amount = Format::new()
        .set_bold()
        .set_font_size(12)
        .set_num_format("0.00");
    let incoming = Format::new()
        .set_num_format("0.00")
        .set_font_color(Color::RGB(INCOMING_COLOR));
    let outgoing = Format::new()
        .set_num_format("0.00")
        .set_font_color(Color::RGB(OUTGOING_COLOR));
    let plain = Format::new();

    let mut widths = [0usize; COLUMNS as usize];
    let mut track = |col: u16, text: &str| {
        let w = &mut widths[col as usize];
        *w = (*w).max(text.chars().count());
    };

    for (idx, line) in layout(rows).iter().enumerate() {
        let row = idx as u32;
        match line {
            SheetLine::OrganizationHeader(name) => {
                sheet
                    .merge_range(row, 0, row, COLUMNS - 1, name, &org_header)
                    .map_err(xlsx_err)?;
                track(0, name);
            }
            SheetLine::AccountHeader(text) => {
                sheet
                    .merge_range(row, 0, row, COLUMNS - 1, text, &account_header)
                    .map_err(xlsx_err)?;
                track(0, text);
            }
            SheetLine::ColumnHeader => {
                for (col, title) in ["Date and time", "Amount", "Comment"].iter().enumerate() {
                    sheet
                        .write_string_with_format(row, col as u16, *title, &bold)
                        .map_err(xlsx_err)?;
                    track(col as u16, title);
                }
            }
            SheetLine::Entry {
                datetime,
                amount,
                comment,
                flow,
            } => {
                let amount_format = match flow {
                    Flow::Incoming => &incoming,
                    Flow::Outgoing => &outgoing,
                };
                sheet
                    .write_string_with_format(row, 0, datetime, &plain)
                    .map_err(xlsx_err)?;
                sheet
                    .write_number_with_format(row, 1, to_f64(*amount), amount_format)
                    .map_err(xlsx_err)?;
                if !comment.is_empty() {
                    sheet
                        .write_string_with_format(row, 2, comment, &plain)
                        .map_err(xlsx_err)?;
                }
                track(0, datetime);
                track(1, &amount.to_string());
                track(2, comment);
            }
            SheetLine::AccountTotal { label, amount } => {
                sheet
                    .write_string_with_format(row, 0, label, &bold)
                    .map_err(xlsx_err)?;
                sheet
                    .write_number_with_format(row, 1, to_f64(*amount), &account_total_amount)
                    .map_err(xlsx_err)?;
                track(0, label);
                track(1, &amount.to_string());
            }
            SheetLine::OrganizationTotal { label, amount } => {
                sheet
                    .write_string_with_format(row, 0, label, &org_total_text)
                    .map_err(xlsx_err)?;
                sheet
                    .write_number_with_format(row, 1, to_f64(*amount), &org_total_amount)
                    .map_err(xlsx_err)?;
                track(0, label);
                track(1, &amount.to_string());
            }
            SheetLine::Blank => {}
        }
    }

    for (col, width) in widths.iter().enumerate() {
        sheet
            .set_column_width(col as u16, (*width + 2) as f64)
            .map_err(xlsx_err)?;
    }

    workbook.save_to_buffer().map_err(xlsx_err)
}

/// Download name for a report covering `from..to` as the caller wrote them.
pub fn file_name(from: &str, to: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    };
    format!("statement_{}_{}.xlsx", clean(from), clean(to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn row(org: i64, account: i64, time: i64, amount: &str, label: &str) -> ReportRow {
        let amount = Decimal::from_str(amount).unwrap();
        ReportRow {
            organization_id: org,
            account_id: account,
            organization_name: format!("Org {}", org),
            account_name: format!("Acc {}", account),
            time,
            datetime: format!("2024-01-15 00:00:{:02}", time),
            amount,
            comment: String::new(),
            flow: if amount.is_sign_negative() {
                Flow::Outgoing
            } else {
                Flow::Incoming
            },
            account_flow_label: label.to_string(),
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn sections_and_subtotals() {
        let rows = vec![
            row(1, 10, 1, "100.00", "incoming and outgoing payments"),
            row(1, 10, 2, "-20.50", "incoming and outgoing payments"),
            row(1, 11, 3, "5.00", "incoming payments"),
            row(2, 20, 4, "7.25", "incoming payments"),
        ];
        let lines = layout(&rows);

        assert_eq!(lines[0], SheetLine::OrganizationHeader("Org 1".to_string()));
        assert_eq!(lines[1], SheetLine::Blank);
        assert_eq!(
            lines[2],
            SheetLine::AccountHeader("Acc 10 — incoming and outgoing payments".to_string())
        );
        assert_eq!(lines[3], SheetLine::ColumnHeader);
        assert!(matches!(lines[4], SheetLine::Entry { .. }));
        assert!(matches!(lines[5], SheetLine::Entry { .. }));
        assert_eq!(
            lines[6],
            SheetLine::AccountTotal {
                label: "Total for account Acc 10 — incoming".to_string(),
                amount: dec("100.00"),
            }
        );
        assert_eq!(
            lines[7],
            SheetLine::AccountTotal {
                label: "Total for account Acc 10 — outgoing".to_string(),
                amount: dec("-20.50"),
            }
        );
        assert_eq!(lines[8], SheetLine::Blank);

        let org_totals: Vec<&SheetLine> = lines
            .iter()
            .filter(|l| matches!(l, SheetLine::OrganizationTotal { .. }))
            .collect();
        assert_eq!(
            org_totals,
            vec![
                &SheetLine::OrganizationTotal {
                    label: "Total for Org 1 — incoming".to_string(),
                    amount: dec("105.00"),
                },
                &SheetLine::OrganizationTotal {
                    label: "Total for Org 1 — outgoing".to_string(),
                    amount: dec("-20.50"),
                },
                &SheetLine::OrganizationTotal {
                    label: "Total for Org 2 — incoming".to_string(),
                    amount: dec("7.25"),
                },
            ]
        );
        assert_eq!(lines[lines.len() - 1], SheetLine::Blank);
        assert_eq!(lines[lines.len() - 2], SheetLine::Blank);
    }

    #[test]
    fn outgoing_total_omitted_when_zero() {
        let lines = layout(&[row(1, 10, 1, "3.00", "incoming payments")]);
        let totals = lines
            .iter()
            .filter(|l| matches!(l, SheetLine::AccountTotal { .. }))
            .count();
        assert_eq!(totals, 1);
    }

    #[test]
    fn workbook_bytes_are_a_zip() {
        let bytes = write_xlsx(&[row(1, 10, 1, "3.00", "incoming payments")]).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn file_name_is_safe() {
        assert_eq!(
            file_name("2024-01-01", "2024-01-31T10:00:00"),
            "statement_2024-01-01_2024-01-31T10_00_00.xlsx"
        );
    }
}
