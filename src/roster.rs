use serde::{Deserialize, Serialize};

use crate::dates;

/// Free-text student details. Everything except the mobile number is stored
/// upper-cased; the date of birth is stored day-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentDetails {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub blood_group: String,
    pub class: String,
    pub section: String,
    pub date_of_birth: String,
    pub gender: String,
    pub class_teacher: String,
    pub hostel: String,
    pub mobile: String,
    pub transport_status: String,
}

fn upper(s: &str) -> String {
    s.trim().to_uppercase()
}

impl StudentDetails {
    /// Normalizes and validates user-entered details.
    pub fn normalized(&self) -> Result<StudentDetails, String> {
        let date_of_birth = dates::normalize_input_date(&self.date_of_birth)
            .ok_or_else(|| "dateOfBirth must be YYYY-MM-DD or DD/MM/YYYY".to_string())?;
        let out = StudentDetails {
            first_name: upper(&self.first_name),
            middle_name: upper(&self.middle_name),
            last_name: upper(&self.last_name),
            blood_group: upper(&self.blood_group),
            class: upper(&self.class),
            section: upper(&self.section),
            date_of_birth,
            gender: upper(&self.gender),
            class_teacher: upper(&self.class_teacher),
            hostel: upper(&self.hostel),
            mobile: self.mobile.trim().to_string(),
            transport_status: upper(&self.transport_status),
        };

        let required = [
            ("firstName", &out.first_name),
            ("lastName", &out.last_name),
            ("class", &out.class),
            ("section", &out.section),
            ("gender", &out.gender),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required fields: {}", missing.join(", ")));
        }
        Ok(out)
    }

    /// `FIRST MIDDLE LAST` with runs of whitespace collapsed.
    pub fn display_name(&self) -> String {
        [&self.first_name, &self.middle_name, &self.last_name]
            .iter()
            .flat_map(|s| s.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn grade_section(&self) -> String {
        format!("{}-{}", self.class, self.section)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub details: StudentDetails,
}
