//! Entity forms.
//!
//! Blank optional text goes out as `null`; a new photo, certificate or image
//! switches the payload to multipart. Existing file URLs are never re-sent.

use chrono::{NaiveDate, NaiveTime};
use sekolah_api_models::{
    Achievement, Comment, Gender, Notification, OlympiadReport, Post, RecordId, Schedule,
    SchoolClass, Student, Teacher,
};

use crate::error::{ClientError, ClientResult};
use crate::form::{FieldValue, FormFields, FormPayload, Upload};

fn text(value: &str) -> FieldValue {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        FieldValue::Null
    } else {
        FieldValue::Text(trimmed.to_string())
    }
}

fn attach(payload: &mut FormPayload, name: &str, upload: Option<&Upload>) {
    if let Some(upload) = upload {
        payload.set(name, upload.clone());
    }
}

/// Student form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentForm {
    /// Full name.
    pub student_name: String,
    /// National student number.
    pub nisn: String,
    /// School-local student number.
    pub nis: String,
    /// Gender.
    pub gender: Option<Gender>,
    /// Class selected through the class dropdown.
    pub class_id: Option<RecordId>,
    /// Place of birth.
    pub birth_place: String,
    /// Date of birth.
    pub birth_date: Option<NaiveDate>,
    /// Home address.
    pub address: String,
    /// Newly chosen photo.
    pub photo: Option<Upload>,
}

impl FormFields for StudentForm {
    type Record = Student;
    const REQUIRED: &'static [&'static str] = &["student_name", "nisn", "gender", "class_id"];

    fn from_record(record: Option<&Student>) -> Self {
        record.map_or_else(Self::default, |student| Self {
            student_name: student.student_name.clone(),
            nisn: student.nisn.clone().unwrap_or_default(),
            nis: student.nis.clone().unwrap_or_default(),
            gender: student.gender,
            class_id: student.class_id,
            birth_place: student.birth_place.clone().unwrap_or_default(),
            birth_date: student.birth_date,
            address: student.address.clone().unwrap_or_default(),
            photo: None,
        })
    }

    fn to_payload(&self) -> FormPayload {
        let mut payload = FormPayload::new()
            .with("student_name", text(&self.student_name))
            .with("nisn", text(&self.nisn))
            .with("nis", text(&self.nis))
            .with("gender", self.gender)
            .with("class_id", self.class_id)
            .with("birth_place", text(&self.birth_place))
            .with("birth_date", self.birth_date)
            .with("address", text(&self.address));
        attach(&mut payload, "photo", self.photo.as_ref());
        payload
    }
}

/// Teacher form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeacherForm {
    /// Full name.
    pub teacher_name: String,
    /// Foundation staff number.
    pub niy: Option<i64>,
    /// Gender.
    pub gender: Option<Gender>,
    /// Main subject.
    pub subject: String,
    /// Contact e-mail.
    pub email: String,
    /// Contact phone.
    pub phone: String,
    /// Newly chosen photo.
    pub photo: Option<Upload>,
}

impl FormFields for TeacherForm {
    type Record = Teacher;
    const REQUIRED: &'static [&'static str] = &["teacher_name", "gender"];

    fn from_record(record: Option<&Teacher>) -> Self {
        record.map_or_else(Self::default, |teacher| Self {
            teacher_name: teacher.teacher_name.clone(),
            niy: teacher.niy,
            gender: teacher.gender,
            subject: teacher.subject.clone().unwrap_or_default(),
            email: teacher.email.clone().unwrap_or_default(),
            phone: teacher.phone.clone().unwrap_or_default(),
            photo: None,
        })
    }

    fn to_payload(&self) -> FormPayload {
        let mut payload = FormPayload::new()
            .with("teacher_name", text(&self.teacher_name))
            .with("niy", self.niy)
            .with("gender", self.gender)
            .with("subject", text(&self.subject))
            .with("email", text(&self.email))
            .with("phone", text(&self.phone));
        attach(&mut payload, "photo", self.photo.as_ref());
        payload
    }

    fn validate(&self) -> ClientResult<()> {
        let email = self.email.trim();
        if !email.is_empty() && !email.contains('@') {
            return Err(ClientError::precondition("email must contain '@'"));
        }
        Ok(())
    }
}

/// Class form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassForm {
    /// Class name, e.g. `7A`.
    pub class_name: String,
    /// Grade level.
    pub grade: Option<u8>,
    /// Homeroom teacher selected through the teacher dropdown.
    pub homeroom_teacher_id: Option<RecordId>,
    /// Academic year, e.g. `2024/2025`.
    pub academic_year: String,
}

impl FormFields for ClassForm {
    type Record = SchoolClass;
    const REQUIRED: &'static [&'static str] = &["class_name", "grade"];

    fn from_record(record: Option<&SchoolClass>) -> Self {
        record.map_or_else(Self::default, |class| Self {
            class_name: class.class_name.clone(),
            grade: class.grade,
            homeroom_teacher_id: class.homeroom_teacher_id,
            academic_year: class.academic_year.clone().unwrap_or_default(),
        })
    }

    fn to_payload(&self) -> FormPayload {
        FormPayload::new()
            .with("class_name", text(&self.class_name))
            .with("grade", self.grade)
            .with("homeroom_teacher_id", self.homeroom_teacher_id)
            .with("academic_year", text(&self.academic_year))
    }
}

/// Schedule form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleForm {
    /// Class taught.
    pub class_id: Option<RecordId>,
    /// Teacher teaching.
    pub teacher_id: Option<RecordId>,
    /// Subject.
    pub subject: String,
    /// Day of the week.
    pub day: String,
    /// Lesson start.
    pub start_time: Option<NaiveTime>,
    /// Lesson end.
    pub end_time: Option<NaiveTime>,
}

impl FormFields for ScheduleForm {
    type Record = Schedule;
    const REQUIRED: &'static [&'static str] = &[
        "class_id",
        "teacher_id",
        "subject",
        "day",
        "start_time",
        "end_time",
    ];

    fn from_record(record: Option<&Schedule>) -> Self {
        record.map_or_else(Self::default, |schedule| Self {
            class_id: Some(schedule.class_id),
            teacher_id: Some(schedule.teacher_id),
            subject: schedule.subject.clone(),
            day: schedule.day.clone(),
            start_time: Some(schedule.start_time),
            end_time: Some(schedule.end_time),
        })
    }

    fn to_payload(&self) -> FormPayload {
        FormPayload::new()
            .with("class_id", self.class_id)
            .with("teacher_id", self.teacher_id)
            .with("subject", text(&self.subject))
            .with("day", text(&self.day))
            .with("start_time", self.start_time)
            .with("end_time", self.end_time)
    }

    fn validate(&self) -> ClientResult<()> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end <= start => Err(ClientError::precondition(
                "end_time must be later than start_time",
            )),
            _ => Ok(()),
        }
    }
}

/// Student achievement form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AchievementForm {
    /// Student selected through the student dropdown.
    pub student_id: Option<RecordId>,
    /// Achievement title.
    pub title: String,
    /// Competition level.
    pub level: String,
    /// Placement.
    pub rank: String,
    /// Date achieved.
    pub achieved_on: Option<NaiveDate>,
    /// Free-form description.
    pub description: String,
    /// Newly chosen certificate scan.
    pub certificate: Option<Upload>,
}

impl FormFields for AchievementForm {
    type Record = Achievement;
    const REQUIRED: &'static [&'static str] = &["student_id", "title"];

    fn from_record(record: Option<&Achievement>) -> Self {
        record.map_or_else(Self::default, |achievement| Self {
            student_id: Some(achievement.student_id),
            title: achievement.title.clone(),
            level: achievement.level.clone().unwrap_or_default(),
            rank: achievement.rank.clone().unwrap_or_default(),
            achieved_on: achievement.achieved_on,
            description: achievement.description.clone().unwrap_or_default(),
            certificate: None,
        })
    }

    fn to_payload(&self) -> FormPayload {
        let mut payload = FormPayload::new()
            .with("student_id", self.student_id)
            .with("title", text(&self.title))
            .with("level", text(&self.level))
            .with("rank", text(&self.rank))
            .with("achieved_on", self.achieved_on)
            .with("description", text(&self.description));
        attach(&mut payload, "certificate", self.certificate.as_ref());
        payload
    }
}

/// Olympiad participation report form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OlympiadReportForm {
    /// Participating student.
    pub student_id: Option<RecordId>,
    /// Competition name.
    pub competition: String,
    /// Field of study.
    pub field: String,
    /// Stage reached.
    pub stage: String,
    /// Result obtained.
    pub result: String,
    /// Competition year.
    pub year: Option<i32>,
    /// Newly chosen certificate scan.
    pub certificate: Option<Upload>,
}

impl FormFields for OlympiadReportForm {
    type Record = OlympiadReport;
    const REQUIRED: &'static [&'static str] = &["student_id", "competition", "field"];

    fn from_record(record: Option<&OlympiadReport>) -> Self {
        record.map_or_else(Self::default, |report| Self {
            student_id: Some(report.student_id),
            competition: report.competition.clone(),
            field: report.field.clone(),
            stage: report.stage.clone().unwrap_or_default(),
            result: report.result.clone().unwrap_or_default(),
            year: report.year,
            certificate: None,
        })
    }

    fn to_payload(&self) -> FormPayload {
        let mut payload = FormPayload::new()
            .with("student_id", self.student_id)
            .with("competition", text(&self.competition))
            .with("field", text(&self.field))
            .with("stage", text(&self.stage))
            .with("result", text(&self.result))
            .with("year", self.year);
        attach(&mut payload, "certificate", self.certificate.as_ref());
        payload
    }
}

/// Notification form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationForm {
    /// Headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Optional deep link.
    pub link: String,
}

impl FormFields for NotificationForm {
    type Record = Notification;
    const REQUIRED: &'static [&'static str] = &["title", "message"];

    fn from_record(record: Option<&Notification>) -> Self {
        record.map_or_else(Self::default, |notification| Self {
            title: notification.title.clone(),
            message: notification.message.clone(),
            link: notification.link.clone().unwrap_or_default(),
        })
    }

    fn to_payload(&self) -> FormPayload {
        FormPayload::new()
            .with("title", text(&self.title))
            .with("message", text(&self.message))
            .with("link", text(&self.link))
    }
}

/// Blog post form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostForm {
    /// Post title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Whether the post is visible publicly.
    pub is_published: bool,
    /// Newly chosen header image.
    pub image: Option<Upload>,
}

impl FormFields for PostForm {
    type Record = Post;
    const REQUIRED: &'static [&'static str] = &["title", "content"];

    fn from_record(record: Option<&Post>) -> Self {
        record.map_or_else(Self::default, |post| Self {
            title: post.title.clone(),
            content: post.content.clone(),
            is_published: post.is_published,
            image: None,
        })
    }

    fn to_payload(&self) -> FormPayload {
        let mut payload = FormPayload::new()
            .with("title", text(&self.title))
            .with("content", text(&self.content))
            .with("is_published", self.is_published);
        attach(&mut payload, "image", self.image.as_ref());
        payload
    }
}

/// Post comment form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentForm {
    /// Post commented on.
    pub post: Option<RecordId>,
    /// Commenter name.
    pub name: String,
    /// Comment body.
    pub content: String,
}

impl FormFields for CommentForm {
    type Record = Comment;
    const REQUIRED: &'static [&'static str] = &["post", "name", "content"];

    fn from_record(record: Option<&Comment>) -> Self {
        record.map_or_else(Self::default, |comment| Self {
            post: Some(comment.post),
            name: comment.name.clone(),
            content: comment.content.clone(),
        })
    }

    fn to_payload(&self) -> FormPayload {
        FormPayload::new()
            .with("post", self.post)
            .with("name", text(&self.name))
            .with("content", text(&self.content))
    }
}
