//! Renders a proposal snapshot into a fixed A4 layout: company header,
//! boxed client block, item table with the header row repeated across
//! page breaks, total line and a footer with page numbers on every page.

use anyhow::Result;
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerIndex,
    PdfLayerReference, PdfPageIndex, Point,
};

use crate::proposals::ProposalDetail;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;

const BODY_SIZE: f32 = 10.0;
const LINE_HEIGHT: f32 = 5.0;
// The table never writes below this line; the footer owns it.
const FOOTER_ZONE: f32 = 24.0;

// Right edges of the numeric columns, left edge of the description column.
const COL_DESCRIPTION_X: f32 = MARGIN;
const COL_QUANTITY_RIGHT: f32 = 132.0;
const COL_UNIT_PRICE_RIGHT: f32 = 162.0;
const COL_TOTAL_RIGHT: f32 = PAGE_WIDTH - MARGIN;
const DESC_COL_CHARS: usize = 52;

const POINT_TO_MM: f32 = 0.352_778;
// Average glyph advance for Helvetica, as a fraction of the font size.
const GLYPH_WIDTH_EM: f32 = 0.5;

pub fn render_proposal(
    detail: &ProposalDetail,
    company_name: &str,
    company_address: &str,
) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        format!("Proposta {}", detail.proposal.title),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "content",
    );
    let font = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let mut writer = PageWriter::new(&doc, font, bold, first_page, first_layer);

    write_header(&mut writer, detail, company_name);
    write_client_block(&mut writer, detail);
    write_item_table(&mut writer, detail);
    write_total(&mut writer, detail);
    write_footers(&writer, &doc, company_address);

    let bytes = doc.save_to_bytes()?;
    Ok(bytes)
}

fn write_header(writer: &mut PageWriter<'_>, detail: &ProposalDetail, company_name: &str) {
    writer.text_centered(company_name, 20.0, true);
    writer.advance(10.0);
    writer.text_centered(
        &format!("Proposta Comercial: {}", detail.proposal.title),
        16.0,
        false,
    );
    writer.advance(14.0);
}

fn write_client_block(writer: &mut PageWriter<'_>, detail: &ProposalDetail) {
    let client = &detail.client;
    writer.text(MARGIN, "INFORMAÇÕES DO CLIENTE", 12.0, true);
    writer.advance(7.0);

    let box_top = writer.y + 2.0;
    let lines = [
        format!("Cliente: {}", client.name),
        format!("Email: {}", client.email.as_deref().unwrap_or("-")),
        format!("Telefone: {}", client.phone.as_deref().unwrap_or("-")),
        format!("CNPJ/CPF: {}", client.tax_id.as_deref().unwrap_or("-")),
        format!("Endereço: {}", client.address.as_deref().unwrap_or("-")),
    ];
    for line in &lines {
        writer.text(MARGIN + 4.0, line, BODY_SIZE, false);
        writer.advance(LINE_HEIGHT);
    }
    let box_bottom = writer.y + LINE_HEIGHT - 2.0;
    writer.rect(MARGIN, box_top, PAGE_WIDTH - MARGIN, box_bottom);
    writer.advance(10.0);
}

fn write_item_table(writer: &mut PageWriter<'_>, detail: &ProposalDetail) {
    writer.text(MARGIN, "Itens da Proposta", 14.0, true);
    writer.advance(8.0);
    write_table_header(writer);

    for item in &detail.items {
        let description_lines = wrap_text(&item.description, DESC_COL_CHARS);
        let row_height = description_lines.len().max(1) as f32 * LINE_HEIGHT + 2.0;

        // Mid-table page break: the header row repeats on the new page.
        if writer.y - row_height < FOOTER_ZONE {
            writer.new_page();
            write_table_header(writer);
        }

        let row_top = writer.y;
        for (index, line) in description_lines.iter().enumerate() {
            writer.text_at(
                COL_DESCRIPTION_X,
                row_top - index as f32 * LINE_HEIGHT,
                line,
                BODY_SIZE,
                false,
            );
        }
        writer.text_right(COL_QUANTITY_RIGHT, &item.quantity.to_string(), BODY_SIZE, false);
        writer.text_right(
            COL_UNIT_PRICE_RIGHT,
            &format_currency(item.unit_price),
            BODY_SIZE,
            false,
        );
        writer.text_right(COL_TOTAL_RIGHT, &format_currency(item.total), BODY_SIZE, false);

        writer.advance(row_height);
        writer.hline(MARGIN, PAGE_WIDTH - MARGIN, writer.y + LINE_HEIGHT - 1.0);
    }

    writer.advance(6.0);
}

fn write_table_header(writer: &mut PageWriter<'_>) {
    writer.text(COL_DESCRIPTION_X, "Descrição", BODY_SIZE, true);
    writer.text_right(COL_QUANTITY_RIGHT, "Qtd", BODY_SIZE, true);
    writer.text_right(COL_UNIT_PRICE_RIGHT, "Preço Unit.", BODY_SIZE, true);
    writer.text_right(COL_TOTAL_RIGHT, "Total", BODY_SIZE, true);
    writer.advance(2.0);
    writer.hline(MARGIN, PAGE_WIDTH - MARGIN, writer.y + LINE_HEIGHT - 1.0);
    writer.advance(LINE_HEIGHT);
}

fn write_total(writer: &mut PageWriter<'_>, detail: &ProposalDetail) {
    if writer.y - LINE_HEIGHT < FOOTER_ZONE {
        writer.new_page();
    }
    writer.text_right(
        COL_TOTAL_RIGHT,
        &format!("Valor Total: {}", format_currency(detail.proposal.total_amount)),
        12.0,
        true,
    );
    writer.advance(LINE_HEIGHT);
}

fn write_footers(writer: &PageWriter<'_>, doc: &PdfDocumentReference, company_address: &str) {
    let page_count = writer.pages.len();
    for (number, (page, layer)) in writer.pages.iter().enumerate() {
        let layer = doc.get_page(*page).get_layer(*layer);
        let thanks = "Obrigado por considerar nossa proposta!";
        layer.use_text(
            thanks,
            8.0,
            Mm(centered_x(thanks, 8.0)),
            Mm(16.0),
            &writer.font,
        );
        layer.use_text(
            company_address,
            8.0,
            Mm(centered_x(company_address, 8.0)),
            Mm(12.0),
            &writer.font,
        );
        let pagination = format!("Página {} de {}", number + 1, page_count);
        layer.use_text(
            &pagination,
            8.0,
            Mm(COL_TOTAL_RIGHT - text_width_mm(&pagination, 8.0)),
            Mm(8.0),
            &writer.font,
        );
    }
}

struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    pages: Vec<(PdfPageIndex, PdfLayerIndex)>,
    layer: PdfLayerReference,
    y: f32,
}

impl<'a> PageWriter<'a> {
    fn new(
        doc: &'a PdfDocumentReference,
        font: IndirectFontRef,
        bold: IndirectFontRef,
        page: PdfPageIndex,
        layer: PdfLayerIndex,
    ) -> Self {
        let layer_ref = doc.get_page(page).get_layer(layer);
        Self {
            doc,
            font,
            bold,
            pages: vec![(page, layer)],
            layer: layer_ref,
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "content");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.pages.push((page, layer));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn advance(&mut self, height: f32) {
        self.y -= height;
    }

    fn text(&self, x: f32, text: &str, size: f32, bold: bool) {
        self.text_at(x, self.y, text, size, bold);
    }

    fn text_at(&self, x: f32, y: f32, text: &str, size: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn text_right(&self, right_edge: f32, text: &str, size: f32, bold: bool) {
        self.text_at(right_edge - text_width_mm(text, size), self.y, text, size, bold);
    }

    fn text_centered(&self, text: &str, size: f32, bold: bool) {
        self.text_at(centered_x(text, size), self.y, text, size, bold);
    }

    fn hline(&self, x1: f32, x2: f32, y: f32) {
        let line = Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y)), false),
                (Point::new(Mm(x2), Mm(y)), false),
            ],
            is_closed: false,
        };
        self.layer.add_line(line);
    }

    fn rect(&self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let outline = Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y1)), false),
                (Point::new(Mm(x2), Mm(y1)), false),
                (Point::new(Mm(x2), Mm(y2)), false),
                (Point::new(Mm(x1), Mm(y2)), false),
            ],
            is_closed: true,
        };
        self.layer.add_line(outline);
    }
}

/// Approximate rendered width; the builtin fonts expose no metrics, so
/// widths are estimated from an average Helvetica glyph advance.
fn text_width_mm(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * GLYPH_WIDTH_EM * POINT_TO_MM
}

fn centered_x(text: &str, size: f32) -> f32 {
    (PAGE_WIDTH - text_width_mm(text, size)) / 2.0
}

/// Greedy word wrap with a hard break for words longer than the column.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split_at = word
                .char_indices()
                .nth(max_chars)
                .map(|(index, _)| index)
                .unwrap_or(word.len());
            lines.push(word[..split_at].to_string());
            word = &word[split_at..];
        }

        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Formats integer minor currency units for display (pt-BR grouping),
/// e.g. 123456 -> "R$ 1.234,56".
pub fn format_currency(cents: i64) -> String {
    let negative = cents < 0;
    let cents = cents.unsigned_abs();
    let whole = cents / 100;
    let fraction = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}R$ {grouped},{fraction:02}")
}
