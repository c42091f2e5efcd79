//! Resource paths below `/api/v1/campaigns/{campaignId}`.

pub fn phases() -> String {
    "/phases.json".to_string()
}

pub fn phase(phase_id: i64) -> String {
    format!("/phases/{}.json", phase_id)
}

pub fn phase_condition(phase_id: i64, condition_id: i64) -> String {
    format!("/phases/{}/phase_conditions/{}.json", phase_id, condition_id)
}

pub fn phase_activities(phase_id: i64) -> String {
    format!("/phases/{}/phase_activities.json", phase_id)
}

pub fn phase_activity(phase_id: i64, activity_id: i64) -> String {
    format!("/phases/{}/phase_activities/{}.json", phase_id, activity_id)
}

pub fn phase_activity_condition(phase_id: i64, activity_id: i64, condition_id: i64) -> String {
    format!(
        "/phases/{}/phase_activities/{}/phase_activity_conditions/{}.json",
        phase_id, activity_id, condition_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(phases(), "/phases.json");
        assert_eq!(phase(4), "/phases/4.json");
        assert_eq!(phase_condition(4, 9), "/phases/4/phase_conditions/9.json");
        assert_eq!(phase_activities(4), "/phases/4/phase_activities.json");
        assert_eq!(phase_activity(4, 2), "/phases/4/phase_activities/2.json");
        assert_eq!(
            phase_activity_condition(4, 2, 8),
            "/phases/4/phase_activities/2/phase_activity_conditions/8.json"
        );
    }
}
