//! Prompts sent to the language model.
//!
//! Two prompts live here: the feature-extraction prompt used for every page's
//! OCR text, and the transcription prompt used by the vision OCR engine.
//! The response format of [`FEATURE_EXTRACTION_PROMPT`] is parsed by
//! [`crate::pipeline::llm::parse_feature_response`]; change both together.

/// System prompt for extracting the four document fields from OCR text.
pub const FEATURE_EXTRACTION_PROMPT: &str = r#"You are a document processing expert. Extract key information from the text of one scanned page.
The text was produced by OCR and keeps the reading order of the page, one line per text line.

Extract the following information:
- Document Date: the date of the document in the format "yyyy-mm-dd".
- Document Type: "rechnung" for an invoice, "ktoauszg" for an account statement, otherwise "Other".
- Sender: the name of the sender of the document.
- Invoice Number: leave blank if the type is "Other". For an invoice, the invoice number. For an account statement, first determine the account type: use the IBAN for a bank account and the card number for a credit card or corporate card statement, prefixed with the statement month as number (01,...,12) and a dash. Never use the IBAN of the bank itself, which usually appears in the footer; the account number is in the upper half of the page. Never use a random sequence of digits. IBANs and card numbers never start with 0 and contain no separators other than spaces or dashes. Card numbers are exactly 16 digits in 4 groups of 4 digits. Card statements contain the words "credit card" or "corporate card".

Answer in plain UTF-8 text, one line per field, exactly in this form:
key: value (quality)

Use only the keys "Document Date", "Document Type", "Sender" and "Invoice Number", and use every key exactly once.
Replace the characters " ", "(" and ")" in values with "-".
The quality is a number between 0 and 1: 1 means you are certain about the value, 0 means you are not sure at all.
Do not add any other text."#;

/// Build the user message carrying the page text.
pub fn feature_extraction_input(page_text: &str) -> String {
    format!("Here is the document text:\n\n{}", page_text)
}

/// System prompt for the vision OCR engine: transcribe, do not interpret.
pub const TRANSCRIPTION_PROMPT: &str = r#"You are an OCR engine. Transcribe all text visible in the scanned page image.

Rules:
- Output the text exactly as printed, in reading order, one text line per output line
- Keep numbers, dates, IBANs and reference codes character-exact
- Do not translate, summarise or correct the text
- Do not add Markdown, commentary or explanations"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_names_every_field() {
        for key in ["Document Date", "Document Type", "Sender", "Invoice Number"] {
            assert!(FEATURE_EXTRACTION_PROMPT.contains(key), "missing {key}");
        }
    }

    #[test]
    fn extraction_input_embeds_text() {
        let msg = feature_extraction_input("RECHNUNG Nr. 4711");
        assert!(msg.ends_with("RECHNUNG Nr. 4711"));
    }
}
