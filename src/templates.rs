//! Fixed feedback option sets per event type. Feedback polls never use event
//! titles as options; they use these template answers instead.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::config::CampMode;
use crate::model::EventType;

static STANDARD_FEEDBACK: Lazy<HashMap<EventType, Vec<String>>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert(EventType::Lecture, vec![
        "😻 It was super useful!".to_owned(),
        "🆗 I knew smth before, but still enjoyed it!".to_owned(),
        "😑 It could be better".to_owned(),
        "🏃‍♀️‍➡️ I was attending another class".to_owned(),
    ]);
    map.insert(EventType::Contest, vec![
        "🩷 Wow, I loved it!".to_owned(),
        "😿 It was too hard".to_owned(),
        "🙅‍♂️ I didn't participate".to_owned(),
    ]);
    map.insert(EventType::ExtraLecture, vec![
        "🤩 Cool – It was informative and useful".to_owned(),
        "👍 Okay – It was interesting but not so relevant".to_owned(),
        "😞 Meh – It could have been better".to_owned(),
        "🛑 I didn't participate".to_owned(),
    ]);
    map.insert(EventType::EveningActivity, vec![
        "❤️‍🔥 Cool – I want more like it".to_owned(),
        "😃 Okay – It was fun".to_owned(),
        "😕 Meh – I could do something better".to_owned(),
        "🙈 I didn't participate".to_owned(),
    ]);

    map
});

static CYPRUS_FEEDBACK: Lazy<HashMap<EventType, Vec<String>>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert(EventType::Contest, vec![
        "🩷 Wow, I loved it!".to_owned(),
        "😿 It was too hard".to_owned(),
        "🥱 It was too easy".to_owned(),
        "😑 It was OK".to_owned(),
        "😕 I didn't like it".to_owned(),
    ]);
    map.insert(EventType::ContestEditorial, vec![
        "😻 It was super useful!".to_owned(),
        "🆗 I knew smth before, but still enjoyed it!".to_owned(),
        "😑 It could be better".to_owned(),
        "🏃‍♀️‍➡️ I didn't attend the editorial".to_owned(),
    ]);
    map.insert(EventType::ExtraLecture, vec![
        "🤩 Cool – It was informative and useful".to_owned(),
        "👍 Okay – It was interesting but not so relevant".to_owned(),
        "😞 Meh – It could have been better".to_owned(),
        "🛑 I didn't participate".to_owned(),
    ]);
    map.insert(EventType::EveningActivity, vec![
        "❤️‍🔥 Cool – I want more like it".to_owned(),
        "😃 Okay – It was fun".to_owned(),
        "😕 Meh – I could do something better".to_owned(),
        "🙈 I didn't participate".to_owned(),
    ]);

    map
});

/// The option set for a feedback poll about this event type, or `None` when
/// the mode has no template for it (such events get no feedback poll).
pub fn feedback_options(mode: CampMode, event_type: EventType) -> Option<&'static [String]> {
    let map = match mode {
        CampMode::Standard => &*STANDARD_FEEDBACK,
        CampMode::Cyprus => &*CYPRUS_FEEDBACK,
    };
    map.get(&event_type).map(|v| v.as_slice())
}

pub fn has_feedback_template(mode: CampMode, event_type: EventType) -> bool {
    feedback_options(mode, event_type).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyprus_covers_everything_but_plain_lectures() {
        assert!(has_feedback_template(CampMode::Cyprus, EventType::Contest));
        assert!(has_feedback_template(CampMode::Cyprus, EventType::ContestEditorial));
        assert!(has_feedback_template(CampMode::Cyprus, EventType::ExtraLecture));
        assert!(has_feedback_template(CampMode::Cyprus, EventType::EveningActivity));
        assert!(!has_feedback_template(CampMode::Cyprus, EventType::Lecture));
    }

    #[test]
    fn standard_has_no_editorial_template() {
        assert!(has_feedback_template(CampMode::Standard, EventType::Lecture));
        assert!(!has_feedback_template(CampMode::Standard, EventType::ContestEditorial));
    }

    #[test]
    fn option_sets_stay_within_the_poll_cap() {
        for mode in [CampMode::Standard, CampMode::Cyprus] {
            for ty in [
                EventType::Lecture,
                EventType::Contest,
                EventType::ContestEditorial,
                EventType::ExtraLecture,
                EventType::EveningActivity,
            ] {
                if let Some(options) = feedback_options(mode, ty) {
                    assert!(!options.is_empty());
                    assert!(options.len() <= 10);
                }
            }
        }
    }
}
