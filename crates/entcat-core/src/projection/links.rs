//! Enrollment URLs and activity identifiers for catalog content.

use crate::model::{ContentType, EnterpriseCatalog, EnterpriseContext};

use super::utm::{enterprise_utm_context, update_query_parameters};

/// Link builder for one catalog of one enterprise.
pub struct CatalogLinks<'a> {
    lms_base_url: &'a str,
    catalog: &'a EnterpriseCatalog,
    enterprise: &'a EnterpriseContext,
}

impl<'a> CatalogLinks<'a> {
    /// Links for `catalog` served to `enterprise`.
    pub fn new(
        lms_base_url: &'a str,
        catalog: &'a EnterpriseCatalog,
        enterprise: &'a EnterpriseContext,
    ) -> Self {
        Self {
            lms_base_url,
            catalog,
            enterprise,
        }
    }

    /// Enrollment URL for a course or course run.
    ///
    /// A course run passes its course as `parent_content_key`: the URL points
    /// at the course and names the run in `course_run_id`. Without a content
    /// key the URL is blank.
    pub fn enrollment_url(
        &self,
        content_key: Option<&str>,
        parent_content_key: Option<&str>,
    ) -> String {
        let Some(content_key) = content_key.filter(|key| !key.is_empty()) else {
            return String::new();
        };
        let parent_content_key = parent_content_key.filter(|key| !key.is_empty());
        let course_key = parent_content_key.unwrap_or(content_key);

        let url = format!(
            "{}/enterprise/{}/course/{}/enroll/",
            self.lms_base_url, self.catalog.enterprise_uuid, course_key
        );

        let mut params = vec![("catalog".to_string(), self.catalog.uuid.to_string())];
        if parent_content_key.is_some() {
            params.push(("course_run_id".to_string(), content_key.to_string()));
        }
        params.extend(enterprise_utm_context(&self.enterprise.name));
        if self.catalog.publish_audit_enrollment_urls {
            params.push(("audit".to_string(), "true".to_string()));
        }

        update_query_parameters(&url, &params)
    }

    /// xAPI activity identifier for a piece of content.
    pub fn xapi_activity_id(
        &self,
        content_type: ContentType,
        content_key: Option<&str>,
    ) -> Option<String> {
        let content_key = content_key.filter(|key| !key.is_empty())?;
        Some(format!(
            "{}/xapi/activities/{}/{}",
            self.lms_base_url, content_type, content_key
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn fixtures() -> (EnterpriseCatalog, EnterpriseContext) {
        let enterprise = EnterpriseContext::new(Uuid::new_v4(), "Acme");
        let catalog = EnterpriseCatalog::new(Uuid::new_v4(), "All", enterprise.uuid);
        (catalog, enterprise)
    }

    #[test]
    fn test_course_enrollment_url() {
        let (catalog, enterprise) = fixtures();
        let links = CatalogLinks::new("https://lms.example.com", &catalog, &enterprise);

        let url = links.enrollment_url(Some("edX+DemoX"), None);
        assert_eq!(
            url,
            format!(
                "https://lms.example.com/enterprise/{}/course/edX+DemoX/enroll/\
                 ?catalog={}&utm_medium=enterprise&utm_source=acme",
                enterprise.uuid, catalog.uuid
            )
        );
    }

    #[test]
    fn test_course_run_enrollment_url_uses_parent() {
        let (catalog, enterprise) = fixtures();
        let links = CatalogLinks::new("https://lms.example.com", &catalog, &enterprise);

        let url = links.enrollment_url(Some("course-v1:edX+DemoX+2024"), Some("edX+DemoX"));
        assert!(url.contains("/course/edX+DemoX/enroll/"));
        assert!(url.contains("course_run_id=course-v1%3AedX%2BDemoX%2B2024"));
    }

    #[test]
    fn test_audit_flag() {
        let (catalog, enterprise) = fixtures();
        let catalog = catalog.with_audit_enrollment_urls(true);
        let links = CatalogLinks::new("https://lms.example.com", &catalog, &enterprise);

        assert!(links.enrollment_url(Some("edX+DemoX"), None).ends_with("&audit=true"));
    }

    #[test]
    fn test_missing_key_is_blank() {
        let (catalog, enterprise) = fixtures();
        let links = CatalogLinks::new("https://lms.example.com", &catalog, &enterprise);

        assert_eq!(links.enrollment_url(None, None), "");
        assert_eq!(links.xapi_activity_id(ContentType::Program, None), None);
    }

    #[test]
    fn test_xapi_activity_id() {
        let (catalog, enterprise) = fixtures();
        let links = CatalogLinks::new("https://lms.example.com", &catalog, &enterprise);

        assert_eq!(
            links.xapi_activity_id(ContentType::CourseRun, Some("course-v1:edX+DemoX+2024")),
            Some(
                "https://lms.example.com/xapi/activities/courserun/course-v1:edX+DemoX+2024"
                    .to_string()
            )
        );
    }
}
