use crate::traits::HasConditions;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

// Sets the provided condition on any object that implements the HasConditions trait.
//
// The condition on the object is only replaced if the new condition has a different status,
// otherwise only the observed generation is carried over.
pub fn set_condition<T: HasConditions>(obj: &mut T, new_cond: metav1::Condition) {
    if let Some(conditions) = obj.get_conditions_mut() {
        for condition in conditions.iter_mut() {
            if condition.type_ == new_cond.type_ {
                if condition.status == new_cond.status {
                    // always update the observed generation
                    condition.observed_generation = new_cond.observed_generation;
                    return;
                }
                *condition = new_cond;
                return;
            }
        }
        conditions.push(new_cond);
    } else {
        obj.get_conditions_mut().replace(vec![new_cond]);
    }
}

// Returns true if the provided error is a not found error.
pub fn check_if_not_found_err(error: &kube::Error) -> bool {
    if let kube::Error::Api(response) = error {
        if response.code == 404 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::gslb;
    use chrono::Utc;

    fn ready(status: &str, generation: i64) -> metav1::Condition {
        metav1::Condition {
            type_: "Ready".to_string(),
            status: status.to_string(),
            reason: "Test".to_string(),
            message: String::new(),
            observed_generation: Some(generation),
            last_transition_time: metav1::Time(Utc::now()),
        }
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut obj = gslb("test-gslb", "test-gslb");
        let first = ready("True", 1);
        set_condition(&mut obj, first.clone());
        set_condition(&mut obj, ready("True", 2));

        let conditions = obj.status.unwrap().conditions.unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].observed_generation, Some(2));
        assert_eq!(conditions[0].last_transition_time, first.last_transition_time);
    }

    #[test]
    fn test_set_condition_replaces_on_status_change() {
        let mut obj = gslb("test-gslb", "test-gslb");
        set_condition(&mut obj, ready("True", 1));
        set_condition(&mut obj, ready("False", 1));

        let conditions = obj.status.unwrap().conditions.unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "False");
    }
}
