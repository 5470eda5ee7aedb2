use chrono::NaiveDate;
use csv::Writer;

use crate::error::{AppError, AppResult};
use crate::table::DisplayRow;

/// Column order of every export
pub const EXPORT_HEADERS: [&str; 36] = [
    "Gene ID",
    "Symbol",
    "Name",
    "Chromosome",
    "Organism",
    "Protein Name",
    "Priority",
    "Assigned To",
    "Last Modified",
    "Status",
    "Tags",
    "Notes",
    "NBT Number",
    "Catalog Number",
    "Host",
    "Clone",
    "Clonality",
    "Isotype",
    "Price (USD)",
    "Parent Product ID",
    "Light Chain",
    "Storage Temperature",
    "Lead Time",
    "Country of Origin",
    "Datasheet URL",
    "Website URL",
    "Product Application",
    "Research Area",
    "Image URL",
    "Image Filename",
    "Image Caption",
    "Positive Control",
    "Expression System",
    "Purification",
    "Supplied As",
    "Immunogen",
];

/// Cell values of one row, in [`EXPORT_HEADERS`] order
pub fn export_record(row: &DisplayRow) -> Vec<String> {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    let f = &row.fields;

    vec![
        row.id.clone(),
        row.symbol.clone(),
        row.name.clone(),
        row.chromosome.clone(),
        row.organism.clone(),
        row.protein_name.clone(),
        row.priority.to_string(),
        row.assigned_to.clone(),
        row.last_modified.clone(),
        row.status.to_string(),
        row.tags_joined(),
        text(&f.notes),
        text(&f.nbt_num),
        text(&f.catalog_num),
        text(&f.host),
        text(&f.clone),
        text(&f.clonality),
        text(&f.isotype),
        f.price_usd.map(|price| price.to_string()).unwrap_or_default(),
        text(&f.parent_product_id),
        text(&f.light_chain),
        text(&f.storage_temperature),
        text(&f.lead_time),
        text(&f.country_of_origin),
        text(&f.datasheet_url),
        text(&f.website_url_to_product),
        text(&f.product_application),
        text(&f.research_area),
        text(&f.image_url),
        text(&f.image_filename),
        text(&f.image_caption),
        text(&f.positive_control),
        text(&f.expression_system),
        text(&f.purification),
        text(&f.supplied_as),
        text(&f.immunogen),
    ]
}

/// Convert table rows to CSV
///
/// Fields containing commas, quotes or newlines are quoted with inner quotes
/// doubled, so the output reads back through the import parser unchanged.
///
/// # Arguments
/// * `rows` - The (already filtered) rows to export
///
/// # Returns
/// * `AppResult<String>` - CSV content including the header line
pub fn to_csv(rows: &[DisplayRow]) -> AppResult<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADERS)?;
    for row in rows {
        writer.write_record(export_record(row))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Convert table rows to XLSX
///
/// Same columns as [`to_csv`]; the price column is written as a number.
///
/// # Returns
/// * `AppResult<Vec<u8>>` - XLSX file content as bytes
#[cfg(feature = "web")]
pub fn to_xlsx(rows: &[DisplayRow]) -> AppResult<Vec<u8>> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

    const PRICE_COLUMN: u16 = 18;

    fn xlsx(e: XlsxError) -> AppError {
        AppError::Storage(format!("xlsx export failed: {e}"))
    }

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    let bold = Format::new().set_bold();

    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *header, &bold)
            .map_err(xlsx)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let r = (index + 1) as u32;
        for (col, value) in export_record(row).iter().enumerate() {
            let col = col as u16;
            match row.fields.price_usd {
                Some(price) if col == PRICE_COLUMN => {
                    worksheet.write_number(r, col, price).map_err(xlsx)?;
                }
                _ => {
                    worksheet.write_string(r, col, value).map_err(xlsx)?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer().map_err(xlsx)
}

/// `gene_data_<YYYY-MM-DD>.<extension>`
pub fn export_filename(date: NaiveDate, extension: &str) -> String {
    format!("gene_data_{}.{extension}", date.format("%Y-%m-%d"))
}
