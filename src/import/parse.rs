//! Readers for the bank statement formats that can be imported.

use std::str::FromStr;

use rust_decimal::Decimal;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    Error,
    account::AccountId,
    transaction::{TransactionData, TransactionType},
};

const CSV_DATE_FORMATS: [&[BorrowedFormatItem<'static>]; 2] = [
    format_description!("[year]-[month]-[day]"),
    format_description!("[day]/[month]/[year]"),
];

const OFX_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]");

/// A transaction read from a statement, before it is validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedTransaction {
    pub date: Date,
    /// Always positive.
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub description: String,
    pub merchant: String,
    pub notes: String,
    pub external_id: Option<String>,
}

impl ImportedTransaction {
    pub fn into_transaction_data(
        self,
        account_id: AccountId,
        currency: Option<String>,
    ) -> TransactionData {
        let mut data = TransactionData::new(
            self.transaction_type,
            self.amount,
            self.date,
            &self.description,
            account_id,
        );
        data.currency = currency;
        data.merchant = self.merchant;
        data.notes = self.notes;
        data.external_id = self.external_id;

        data
    }
}

/// The transactions read from a statement and the rows that could not be read.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedStatement {
    pub transactions: Vec<ImportedTransaction>,
    pub errors: Vec<String>,
}

/// Parse an amount such as "-1,234.50" or "$12".
fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | ' '))
        .collect();

    Decimal::from_str(&cleaned).ok()
}

/// The type and absolute amount for a signed statement amount.
fn split_signed_amount(amount: Decimal) -> (TransactionType, Decimal) {
    if amount.is_sign_negative() {
        (TransactionType::Expense, amount.abs())
    } else {
        (TransactionType::Income, amount)
    }
}

fn parse_csv_date(text: &str) -> Option<Date> {
    CSV_DATE_FORMATS
        .iter()
        .find_map(|format| Date::parse(text, format).ok())
}

struct CsvColumns {
    date: usize,
    amount: usize,
    description: Option<usize>,
    name: Option<usize>,
    merchant: Option<usize>,
    transaction_type: Option<usize>,
    external_id: Option<usize>,
    notes: Option<usize>,
}

impl CsvColumns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, Error> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|header| names.contains(&header.trim().to_lowercase().as_str()))
        };

        let date = find(&["date"]).ok_or_else(|| missing_column("date"))?;
        let amount = find(&["amount"]).ok_or_else(|| missing_column("amount"))?;
        let description = find(&["description"]);
        let name = find(&["name"]);

        if description.is_none() && name.is_none() {
            return Err(missing_column("description"));
        }

        Ok(Self {
            date,
            amount,
            description,
            name,
            merchant: find(&["merchant"]),
            transaction_type: find(&["type"]),
            external_id: find(&["external_id", "id"]),
            notes: find(&["notes"]),
        })
    }

    fn read(&self, record: &csv::StringRecord) -> Result<ImportedTransaction, String> {
        let field = |index: Option<usize>| {
            index
                .and_then(|index| record.get(index))
                .map(str::trim)
                .unwrap_or_default()
        };

        let date_text = field(Some(self.date));
        let date = parse_csv_date(date_text).ok_or_else(|| format!("invalid date \"{date_text}\""))?;

        let amount_text = field(Some(self.amount));
        let amount =
            parse_amount(amount_text).ok_or_else(|| format!("invalid amount \"{amount_text}\""))?;

        let (transaction_type, amount) = match field(self.transaction_type) {
            "" => split_signed_amount(amount),
            type_text => {
                let transaction_type = TransactionType::from_str(&type_text.to_lowercase())
                    .map_err(|_| format!("invalid type \"{type_text}\""))?;
                (transaction_type, amount.abs())
            }
        };

        let description = match field(self.description) {
            "" => field(self.name),
            description => description,
        };

        Ok(ImportedTransaction {
            date,
            amount,
            transaction_type,
            description: description.to_owned(),
            merchant: field(self.merchant).to_owned(),
            notes: field(self.notes).to_owned(),
            external_id: Some(field(self.external_id))
                .filter(|id| !id.is_empty())
                .map(str::to_owned),
        })
    }
}

fn missing_column(name: &str) -> Error {
    Error::InvalidCSV(format!("missing column \"{name}\""))
}

/// Read the transactions in a CSV statement with a header row.
///
/// Rows that cannot be read are reported in [ParsedStatement::errors] with their line number.
///
/// # Errors
/// Returns [Error::InvalidCSV] if the header is missing a required column or the file is not
/// valid CSV.
pub fn parse_csv(text: &str) -> Result<ParsedStatement, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|error| Error::InvalidCSV(error.to_string()))?;
    let columns = CsvColumns::from_headers(headers)?;

    let mut statement = ParsedStatement::default();

    for record in reader.records() {
        let record = record.map_err(|error| Error::InvalidCSV(error.to_string()))?;

        if record.iter().all(str::is_empty) {
            continue;
        }

        let line = record.position().map_or(0, |position| position.line());

        match columns.read(&record) {
            Ok(transaction) => statement.transactions.push(transaction),
            Err(message) => statement.errors.push(format!("line {line}: {message}")),
        }
    }

    Ok(statement)
}

#[derive(Default)]
struct OfxTransactionBuilder {
    fit_id: Option<String>,
    posted: Option<String>,
    amount: Option<String>,
    name: Option<String>,
    memo: Option<String>,
}

impl OfxTransactionBuilder {
    fn build(self) -> Result<ImportedTransaction, String> {
        let posted = self.posted.ok_or("missing DTPOSTED")?;
        let date = posted
            .get(..8)
            .and_then(|date| Date::parse(date, OFX_DATE_FORMAT).ok())
            .ok_or_else(|| format!("invalid DTPOSTED \"{posted}\""))?;

        let amount_text = self.amount.ok_or("missing TRNAMT")?;
        let amount =
            parse_amount(&amount_text).ok_or_else(|| format!("invalid TRNAMT \"{amount_text}\""))?;
        let (transaction_type, amount) = split_signed_amount(amount);

        let name = self.name.unwrap_or_default();
        let memo = self.memo.unwrap_or_default();
        let description = if name.is_empty() { memo.clone() } else { name.clone() };

        Ok(ImportedTransaction {
            date,
            amount,
            transaction_type,
            description,
            merchant: name,
            notes: memo,
            external_id: self.fit_id,
        })
    }
}

/// Split an SGML line such as `<TRNAMT>-12.50` or `<NAME>Shop</NAME>` into its tag and value.
fn split_tag(line: &str) -> Option<(String, Option<String>)> {
    let tag = line.strip_prefix('<')?;

    match tag.split_once('>') {
        Some((name, value)) => {
            let value = value.split('<').next().unwrap_or_default().trim();
            let value = (!value.is_empty()).then(|| value.to_owned());
            Some((name.trim().to_uppercase(), value))
        }
        None => Some((tag.trim().to_uppercase(), None)),
    }
}

/// Read the `STMTTRN` blocks of an OFX statement.
///
/// # Errors
/// Returns [Error::InvalidOFX] if the text is not an OFX document.
pub fn parse_ofx(text: &str) -> Result<ParsedStatement, Error> {
    if !text.to_uppercase().contains("<OFX>") {
        return Err(Error::InvalidOFX("missing <OFX> element".to_owned()));
    }

    let mut statement = ParsedStatement::default();
    let mut current: Option<OfxTransactionBuilder> = None;
    let mut block = 0;

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((tag, value)) = split_tag(line) else {
            continue;
        };

        match tag.as_str() {
            "STMTTRN" => {
                block += 1;
                current = Some(OfxTransactionBuilder::default());
            }
            "/STMTTRN" => {
                if let Some(builder) = current.take() {
                    match builder.build() {
                        Ok(transaction) => statement.transactions.push(transaction),
                        Err(message) => statement
                            .errors
                            .push(format!("transaction {block}: {message}")),
                    }
                }
            }
            field => {
                let Some(builder) = current.as_mut() else {
                    continue;
                };

                match field {
                    "FITID" => builder.fit_id = value,
                    "DTPOSTED" => builder.posted = value,
                    "TRNAMT" => builder.amount = value,
                    "NAME" => builder.name = value,
                    "MEMO" => builder.memo = value,
                    _ => {}
                }
            }
        }
    }

    if current.is_some() {
        return Err(Error::InvalidOFX(format!(
            "transaction {block} is missing </STMTTRN>"
        )));
    }

    Ok(statement)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use time::macros::date;

    use crate::{Error, transaction::TransactionType};

    use super::{ImportedTransaction, parse_csv, parse_ofx};

    #[test]
    fn csv_signed_amounts_set_type() {
        let text = "Date,Description,Amount,ID\n\
            2024-03-01,Coffee,-4.50,abc1\n\
            02/03/2024,Salary,\"1,500.00\",\n";

        let statement = parse_csv(text).unwrap();

        assert!(statement.errors.is_empty(), "{:?}", statement.errors);
        assert_eq!(
            statement.transactions,
            [
                ImportedTransaction {
                    date: date!(2024 - 03 - 01),
                    amount: Decimal::new(450, 2),
                    transaction_type: TransactionType::Expense,
                    description: "Coffee".to_owned(),
                    merchant: String::new(),
                    notes: String::new(),
                    external_id: Some("abc1".to_owned()),
                },
                ImportedTransaction {
                    date: date!(2024 - 03 - 02),
                    amount: Decimal::new(150000, 2),
                    transaction_type: TransactionType::Income,
                    description: "Salary".to_owned(),
                    merchant: String::new(),
                    notes: String::new(),
                    external_id: None,
                },
            ]
        );
    }

    #[test]
    fn csv_type_column_uses_absolute_amount() {
        let text = "date,name,amount,type,merchant,notes\n\
            2024-03-01,Refund,-20,income,Shop,returned shoes\n";

        let statement = parse_csv(text).unwrap();

        let transaction = &statement.transactions[0];
        assert_eq!(transaction.transaction_type, TransactionType::Income);
        assert_eq!(transaction.amount, Decimal::from(20));
        assert_eq!(transaction.description, "Refund");
        assert_eq!(transaction.merchant, "Shop");
        assert_eq!(transaction.notes, "returned shoes");
    }

    #[test]
    fn csv_bad_rows_are_reported_by_line() {
        let text = "date,description,amount\n\
            2024-03-01,Coffee,-4.50\n\
            yesterday,Lunch,-12\n\
            2024-03-03,Dinner,lots\n";

        let statement = parse_csv(text).unwrap();

        assert_eq!(statement.transactions.len(), 1);
        assert_eq!(
            statement.errors,
            [
                "line 3: invalid date \"yesterday\"",
                "line 4: invalid amount \"lots\"",
            ]
        );
    }

    #[test]
    fn csv_missing_required_column_fails() {
        assert_eq!(
            parse_csv("date,description\n2024-03-01,Coffee\n"),
            Err(Error::InvalidCSV("missing column \"amount\"".to_owned()))
        );
        assert_eq!(
            parse_csv("date,amount\n2024-03-01,-4\n"),
            Err(Error::InvalidCSV("missing column \"description\"".to_owned()))
        );
    }

    const OFX_STATEMENT: &str = "OFXHEADER:100
DATA:OFXSGML

<OFX>
<BANKMSGSRSV1>
<STMTTRNRS>
<STMTRS>
<BANKTRANLIST>
<STMTTRN>
<TRNTYPE>DEBIT
<DTPOSTED>20240301120000[+12:NZT]
<TRNAMT>-45.20
<FITID>202403010001
<NAME>COUNTDOWN
<MEMO>Groceries
</STMTTRN>
<STMTTRN>
<TRNTYPE>CREDIT
<DTPOSTED>20240302
<TRNAMT>2,000.00
<FITID>202403020001
<MEMO>Salary</MEMO>
</STMTTRN>
<STMTTRN>
<TRNTYPE>DEBIT
<TRNAMT>-1.00
<FITID>202403030001
</STMTTRN>
</BANKTRANLIST>
</STMTRS>
</STMTTRNRS>
</BANKMSGSRSV1>
</OFX>";

    #[test]
    fn ofx_reads_transaction_blocks() {
        let statement = parse_ofx(OFX_STATEMENT).unwrap();

        assert_eq!(
            statement.transactions,
            [
                ImportedTransaction {
                    date: date!(2024 - 03 - 01),
                    amount: Decimal::new(4520, 2),
                    transaction_type: TransactionType::Expense,
                    description: "COUNTDOWN".to_owned(),
                    merchant: "COUNTDOWN".to_owned(),
                    notes: "Groceries".to_owned(),
                    external_id: Some("202403010001".to_owned()),
                },
                ImportedTransaction {
                    date: date!(2024 - 03 - 02),
                    amount: Decimal::new(200000, 2),
                    transaction_type: TransactionType::Income,
                    description: "Salary".to_owned(),
                    merchant: String::new(),
                    notes: "Salary".to_owned(),
                    external_id: Some("202403020001".to_owned()),
                },
            ]
        );
        assert_eq!(statement.errors, ["transaction 3: missing DTPOSTED"]);
    }

    #[test]
    fn ofx_rejects_other_documents() {
        assert!(matches!(
            parse_ofx("date,amount\n"),
            Err(Error::InvalidOFX(_))
        ));
        assert!(matches!(
            parse_ofx("<OFX>\n<STMTTRN>\n<TRNAMT>-1\n"),
            Err(Error::InvalidOFX(_))
        ));
    }
}
