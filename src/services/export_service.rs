use crate::error::Result;
use crate::models::job::Job;
use rust_xlsxwriter::*;

pub struct ExportService;

impl ExportService {
    /// Plain tabular text of the job list, one row per listing.
    pub fn generate_jobs_csv(jobs: &[Job]) -> String {
        let mut out = String::from(
            "Title,Company,Location,Work Type,Salary,Score,Status,Source,Date Posted,Saved,Notes\n",
        );
        for job in jobs {
            let score = if job.match_score < 0 {
                String::new()
            } else {
                job.match_score.to_string()
            };
            let row = [
                job.title.as_str(),
                job.company.as_str(),
                job.location.as_str(),
                job.work_type.as_str(),
                job.salary_display.as_str(),
                score.as_str(),
                job.app_status.as_str(),
                job.source.as_str(),
                job.date_posted.as_str(),
                if job.saved { "yes" } else { "" },
                job.notes.as_str(),
            ];
            let line: Vec<String> = row.iter().map(|f| csv_escape(f)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    /// Styled XLSX workbook of the job list.
    pub fn generate_jobs_xlsx(jobs: &[Job], username: &str) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Jobs")?;

        let primary_color = Color::RGB(0x1E293B);
        let header_bg = Color::RGB(0x0F172A);
        let header_text = Color::White;
        let alt_row_1 = Color::RGB(0xF8FAFC);
        let alt_row_2 = Color::White;
        let border_color = Color::RGB(0xE2E8F0);

        let score_high = Color::RGB(0x10B981);
        let score_mid = Color::RGB(0xF59E0B);
        let score_low = Color::RGB(0xEF4444);
        let score_none = Color::RGB(0x94A3B8);

        let columns = [
            ("Title", 40.0),
            ("Company", 26.0),
            ("Location", 24.0),
            ("Work Type", 12.0),
            ("Salary", 20.0),
            ("Score", 10.0),
            ("Match Reasons", 50.0),
            ("Status", 14.0),
            ("Source", 16.0),
            ("Date Posted", 20.0),
            ("Saved", 8.0),
            ("Notes", 40.0),
        ];

        for (i, (_, width)) in columns.iter().enumerate() {
            worksheet.set_column_width(i as u16, *width)?;
        }

        let title_format = Format::new()
            .set_font_size(16)
            .set_bold()
            .set_font_color(header_text)
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);

        worksheet.set_row_height(0, 40)?;
        worksheet.merge_range(
            0,
            0,
            0,
            (columns.len() - 1) as u16,
            "Job Search Report",
            &title_format,
        )?;

        let subtitle_format = Format::new()
            .set_font_size(10)
            .set_italic()
            .set_font_color(Color::RGB(0x94A3B8))
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);

        worksheet.set_row_height(1, 22)?;
        let now = chrono::Utc::now().format("%d.%m.%Y %H:%M UTC").to_string();
        let subtitle_text = format!(
            "Exported: {}  •  User: {}  •  Listings: {}",
            now,
            username,
            jobs.len()
        );
        worksheet.merge_range(1, 0, 1, (columns.len() - 1) as u16, &subtitle_text, &subtitle_format)?;

        let header_format = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(header_text)
            .set_background_color(header_bg)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap()
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);

        worksheet.set_row_height(2, 28)?;
        for (i, (name, _)) in columns.iter().enumerate() {
            worksheet.write_with_format(2, i as u16, *name, &header_format)?;
        }

        for (idx, job) in jobs.iter().enumerate() {
            let row = (idx + 3) as u32;
            let bg = if idx % 2 == 0 { alt_row_1 } else { alt_row_2 };
            let cell = Format::new()
                .set_font_size(10)
                .set_background_color(bg)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap()
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);

            let score_color = match job.match_score {
                s if s >= 70 => score_high,
                s if s >= 40 => score_mid,
                s if s >= 0 => score_low,
                _ => score_none,
            };
            let score_format = Format::new()
                .set_font_size(10)
                .set_bold()
                .set_font_color(score_color)
                .set_background_color(bg)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);

            worksheet.write_with_format(row, 0, &job.title, &cell)?;
            worksheet.write_with_format(row, 1, &job.company, &cell)?;
            worksheet.write_with_format(row, 2, &job.location, &cell)?;
            worksheet.write_with_format(row, 3, &job.work_type, &cell)?;
            worksheet.write_with_format(row, 4, &job.salary_display, &cell)?;
            if job.match_score >= 0 {
                worksheet.write_with_format(row, 5, job.match_score as f64, &score_format)?;
            } else {
                worksheet.write_with_format(row, 5, "—", &score_format)?;
            }
            worksheet.write_with_format(row, 6, &job.match_reasons, &cell)?;
            worksheet.write_with_format(row, 7, status_label(&job.app_status), &cell)?;
            worksheet.write_with_format(row, 8, &job.source, &cell)?;
            worksheet.write_with_format(row, 9, &job.date_posted, &cell)?;
            worksheet.write_with_format(row, 10, if job.saved { "yes" } else { "" }, &cell)?;
            worksheet.write_with_format(row, 11, &job.notes, &cell)?;
        }

        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }
}

fn status_label(status: &str) -> &str {
    match status {
        "none" => "No Status",
        "interested" => "Interested",
        "applied" => "Applied",
        "interview" => "Interview",
        "offer" => "Offer",
        "rejected" => "Rejected",
        other => other,
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escaping_quotes_commas_and_newlines() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn unscored_jobs_export_with_blank_score() {
        let job = Job {
            id: 1,
            user_id: 1,
            job_id: "x".into(),
            norm_key: "x".into(),
            title: "Dev, Platform".into(),
            company: "Acme".into(),
            location: "Remote".into(),
            lat: None,
            lng: None,
            work_type: "Remote".into(),
            salary_min: None,
            salary_max: None,
            salary_display: String::new(),
            match_score: -1,
            match_reasons: String::new(),
            description: String::new(),
            apply_url: String::new(),
            company_url: String::new(),
            source: "Adzuna".into(),
            date_found: String::new(),
            date_posted: String::new(),
            saved: true,
            hidden: false,
            notes: String::new(),
            app_status: "none".into(),
            is_new: false,
            sheet_row: None,
            from_sheet: false,
        };
        let csv = ExportService::generate_jobs_csv(&[job]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("\"Dev, Platform\",Acme,Remote,Remote,,,none"));
        assert!(lines[1].contains("yes"));
    }
}
