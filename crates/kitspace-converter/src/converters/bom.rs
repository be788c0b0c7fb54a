//! 1-click BOM: normalised `1-click-BOM.tsv` and `bom-info.json`.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::ProjectJob;
use kitspace_worker::{ConversionContext, Converter, ConverterOutput, TaskError};

use crate::discovery;
use crate::error::ConversionError;
use crate::filesystem::has_extension;

pub const BOM_TSV: &str = "1-click-BOM.tsv";
pub const BOM_INFO: &str = "bom-info.json";

/// Retailer columns, in output order.
const RETAILERS: [&str; 6] = ["Digikey", "Mouser", "RS", "Newark", "Farnell", "LCSC"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Reference,
    Quantity,
    Description,
    Manufacturer,
    Mpn,
    Retailer(&'static str),
}

fn column(header: &str) -> Option<Column> {
    let header = header.trim().to_ascii_lowercase();
    let column = match header.as_str() {
        "references" | "reference" | "refs" | "ref" | "designator" | "designators" => {
            Column::Reference
        }
        "quantity" | "qty" | "qnty" | "amount" => Column::Quantity,
        "description" | "desc" | "descr" | "comment" | "value" => Column::Description,
        "manufacturer" | "mfr" | "manufacturer name" => Column::Manufacturer,
        "mpn" | "part number" | "manufacturer part number" | "mfr part number" | "mfr#" => {
            Column::Mpn
        }
        "digikey" | "digi-key" => Column::Retailer("Digikey"),
        "mouser" => Column::Retailer("Mouser"),
        "rs" | "rs components" => Column::Retailer("RS"),
        "newark" => Column::Retailer("Newark"),
        "farnell" | "element14" => Column::Retailer("Farnell"),
        "lcsc" => Column::Retailer("LCSC"),
        _ => return None,
    };
    Some(column)
}

/// A manufacturer part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartNumber {
    pub manufacturer: String,
    pub part: String,
}

/// One BOM line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BomLine {
    pub reference: String,
    pub quantity: u32,
    pub description: String,
    pub part_numbers: Vec<PartNumber>,
    pub retailers: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Bom<'a> {
    lines: &'a [BomLine],
    tsv: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BomInfo<'a> {
    bom: Bom<'a>,
    input_file: String,
}

/// Parse a BOM table. Lines without a usable quantity are skipped with a
/// warning.
pub fn parse_bom(content: &[u8], delimiter: u8) -> Result<Vec<BomLine>, ConversionError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let columns: Vec<Option<Column>> = reader.headers()?.iter().map(column).collect();

    let mut lines = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let mut reference = String::new();
        let mut quantity = None;
        let mut description = String::new();
        let mut manufacturers = Vec::new();
        let mut mpns = Vec::new();
        let mut retailers = BTreeMap::new();

        for (cell, column) in record.iter().zip(&columns) {
            match column {
                Some(Column::Reference) => reference = cell.to_string(),
                Some(Column::Quantity) => quantity = Some(cell),
                Some(Column::Description) => description = cell.to_string(),
                Some(Column::Manufacturer) => manufacturers.push(cell.to_string()),
                Some(Column::Mpn) => mpns.push(cell.to_string()),
                Some(Column::Retailer(name)) if !cell.is_empty() => {
                    retailers.insert(name.to_string(), cell.to_string());
                }
                _ => {}
            }
        }

        let quantity = match quantity.filter(|q| !q.is_empty()) {
            Some(q) => q.parse::<u32>().ok(),
            None => Some(reference_count(&reference)),
        };
        let Some(quantity) = quantity.filter(|q| *q > 0) else {
            tracing::warn!(line = index + 2, "Skipping BOM line without a valid quantity");
            continue;
        };

        manufacturers.resize(mpns.len().max(manufacturers.len()), String::new());
        let part_numbers = manufacturers
            .into_iter()
            .zip(mpns.into_iter().chain(std::iter::repeat(String::new())))
            .filter(|(_, part)| !part.is_empty())
            .map(|(manufacturer, part)| PartNumber { manufacturer, part })
            .collect();

        lines.push(BomLine {
            reference,
            quantity,
            description,
            part_numbers,
            retailers,
        });
    }
    Ok(lines)
}

fn reference_count(reference: &str) -> u32 {
    reference
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|r| !r.is_empty())
        .count() as u32
}

/// Serialise lines in the canonical 1-click BOM column layout.
pub fn write_tsv(lines: &[BomLine]) -> Result<String, ConversionError> {
    let pairs = lines
        .iter()
        .map(|l| l.part_numbers.len())
        .max()
        .unwrap_or(0)
        .max(1);

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());

    let mut header = vec!["References", "Quantity", "Description"];
    for _ in 0..pairs {
        header.extend(["Manufacturer", "MPN"]);
    }
    header.extend(RETAILERS);
    writer.write_record(&header)?;

    for line in lines {
        let mut record = vec![
            line.reference.clone(),
            line.quantity.to_string(),
            line.description.clone(),
        ];
        for i in 0..pairs {
            match line.part_numbers.get(i) {
                Some(p) => record.extend([p.manufacturer.clone(), p.part.clone()]),
                None => record.extend([String::new(), String::new()]),
            }
        }
        for retailer in RETAILERS {
            record.push(line.retailers.get(retailer).cloned().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ConversionError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads the project's BOM and writes it in normalised form.
#[derive(Debug, Default)]
pub struct BomConverter;

impl BomConverter {
    async fn convert(&self, ctx: &ConversionContext) -> Result<ConverterOutput, ConversionError> {
        let checkout = &ctx.job.checkout_dir;
        let input = discovery::bom(checkout, &ctx.job.project.manifest)
            .ok_or_else(|| ConversionError::MissingInput("No BOM file found".into()))?;
        let content = match tokio::fs::read(&input).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConversionError::MissingInput(format!(
                    "BOM file {} not found",
                    relative(checkout, &input)
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let delimiter = if has_extension(&input, "csv") { b',' } else { b'\t' };
        let lines = parse_bom(&content, delimiter)?;
        if lines.is_empty() {
            return Err(ConversionError::EmptyBom);
        }
        let tsv = write_tsv(&lines)?;

        let info = BomInfo {
            bom: Bom {
                lines: &lines,
                tsv: &tsv,
            },
            input_file: relative(checkout, &input),
        };
        let info = serde_json::to_vec(&info)?;

        tracing::debug!(identity = %ctx.job.identity, lines = lines.len(), "Parsed BOM");
        Ok(ConverterOutput::new().with(BOM_TSV, tsv).with(BOM_INFO, info))
    }
}

fn relative(checkout: &Path, path: &Path) -> String {
    path.strip_prefix(checkout)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[async_trait]
impl Converter for BomConverter {
    fn category(&self) -> AssetCategory {
        AssetCategory::Bom
    }

    fn outputs(&self, _job: &ProjectJob) -> Vec<String> {
        vec![BOM_TSV.to_string(), BOM_INFO.to_string()]
    }

    async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
        Ok(self.convert(ctx).await?)
    }
}
