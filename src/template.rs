//! Rendering of the downloadable import template.
//!
//! The backend supplies headers, up to three example rows, and free-text
//! instructions; this module turns that into file bytes for download. The
//! export is a convenience for operators filling in beneficiary lists, not
//! a parser target, so it is rendered as CSV with the instructions served
//! alongside as plain text.

use crate::backend::ImportTemplate;

/// Example rows kept in the rendered template.
const MAX_EXAMPLE_ROWS: usize = 3;

/// Render the template body as CSV bytes: header row plus example rows.
pub fn render_csv(template: &ImportTemplate) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(&template.headers)?;
    for row in template.example_rows.iter().take(MAX_EXAMPLE_ROWS) {
        // Pad or cut rows to the header width so the CSV stays rectangular.
        let mut cells: Vec<&str> = row.iter().map(String::as_str).collect();
        cells.resize(template.headers.len(), "");
        writer.write_record(&cells)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

/// Filename offered for the download.
pub fn download_filename(campagne_id: i64) -> String {
    format!("modele_import_beneficiaires_campagne_{campagne_id}.csv")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> ImportTemplate {
        ImportTemplate {
            headers: vec!["nom".into(), "prenom".into(), "sexe".into()],
            example_rows: vec![
                vec!["Alami".into(), "Sara".into(), "F".into()],
                vec!["Bennis".into(), "Omar".into(), "M".into()],
                vec!["El Fassi".into(), "Nadia".into(), "F".into()],
                vec!["Quatrième".into(), "Ligne".into(), "M".into()],
            ],
            instructions: "Remplissez une ligne par bénéficiaire.".into(),
        }
    }

    #[test]
    fn test_render_keeps_at_most_three_examples() {
        let bytes = render_csv(&template()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4); // header + 3 examples
        assert_eq!(lines[0], "nom,prenom,sexe");
        assert!(!text.contains("Quatrième"));
    }

    #[test]
    fn test_render_pads_short_rows() {
        let mut t = template();
        t.example_rows = vec![vec!["Alami".into()]];
        let text = String::from_utf8(render_csv(&t).unwrap()).unwrap();
        assert_eq!(text.lines().nth(1).unwrap(), "Alami,,");
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(
            download_filename(42),
            "modele_import_beneficiaires_campagne_42.csv"
        );
    }
}
