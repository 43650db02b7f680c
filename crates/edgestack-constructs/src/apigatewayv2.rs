//! HTTP APIs: VPC links, custom domains, stages, integrations and routes.

use std::collections::BTreeMap;

use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::{Hostname, LogicalId};
use edgestack_synth::intrinsic;
use edgestack_synth::logical_id::ConstructPath;
use edgestack_synth::resource::CfnResource;
use edgestack_synth::stack::Stack;
use serde_json::{Value, json};

use crate::ec2::{SubnetSelection, Vpc};
use crate::elbv2::ApplicationListener;

/// Name of the stage that serves requests without a stage prefix.
pub const DEFAULT_STAGE_NAME: &str = "$default";

/// Payload format sent to HTTP proxy integrations.
const PAYLOAD_FORMAT_VERSION: &str = "1.0";

/// A private link from API Gateway into a VPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcLink {
    id: LogicalId,
}

impl VpcLink {
    /// Declares a link named `name` over the selected subnets of `vpc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection matches no subnet or the path is
    /// already used.
    pub fn new(stack: &mut Stack, id: &str, vpc: &Vpc, name: &str, subnets: SubnetSelection) -> Result<Self> {
        let subnet_ids = vpc.subnet_ids(subnets)?;
        let link_id = stack.add_resource(
            &ConstructPath::root(id).child("Resource"),
            CfnResource::new("AWS::ApiGatewayV2::VpcLink").with_properties(json!({
                "Name": name,
                "SecurityGroupIds": [],
                "SubnetIds": subnet_ids,
            })),
        )?;
        tracing::debug!(vpc_link = %link_id, name, "declared VPC link");
        Ok(Self { id: link_id })
    }

    /// Logical id of the link.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// `Ref` to the link, i.e. its id.
    #[must_use]
    pub fn vpc_link_id(&self) -> Value {
        intrinsic::reference(&self.id)
    }
}

/// Where a custom domain is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    /// Through the CloudFront edge network.
    Edge,
    /// From the API's own region.
    Regional,
}

impl EndpointType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Edge => "EDGE",
            Self::Regional => "REGIONAL",
        }
    }
}

/// A custom domain for HTTP APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName {
    id: LogicalId,
    name: Hostname,
    endpoint_type: EndpointType,
}

impl DomainName {
    /// Declares `name` served with the certificate `certificate_arn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is already used.
    pub fn new(
        stack: &mut Stack,
        id: &str,
        name: &Hostname,
        certificate_arn: Value,
        endpoint_type: EndpointType,
    ) -> Result<Self> {
        let domain_id = stack.add_resource(
            &ConstructPath::root(id).child("Resource"),
            CfnResource::new("AWS::ApiGatewayV2::DomainName").with_properties(json!({
                "DomainName": name.as_str(),
                "DomainNameConfigurations": [{
                    "CertificateArn": certificate_arn,
                    "EndpointType": endpoint_type.as_str(),
                }],
            })),
        )?;
        tracing::debug!(domain = %domain_id, name = name.as_str(), endpoint = endpoint_type.as_str(), "declared API domain");
        Ok(Self {
            id: domain_id,
            name: name.clone(),
            endpoint_type,
        })
    }

    /// Logical id of the domain.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// The custom hostname.
    #[must_use]
    pub const fn name(&self) -> &Hostname {
        &self.name
    }

    /// Endpoint type.
    #[must_use]
    pub const fn endpoint_type(&self) -> EndpointType {
        self.endpoint_type
    }

    /// `Fn::GetAtt RegionalDomainName`, the alias target for DNS records.
    #[must_use]
    pub fn regional_domain_name(&self) -> Value {
        intrinsic::get_att(&self.id, "RegionalDomainName")
    }

    /// `Fn::GetAtt RegionalHostedZoneId`, the zone of the alias target.
    #[must_use]
    pub fn regional_hosted_zone_id(&self) -> Value {
        intrinsic::get_att(&self.id, "RegionalHostedZoneId")
    }
}

/// Request methods a route can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HttpMethod {
    /// Every method.
    Any,
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
}

impl HttpMethod {
    /// Method as written in a route key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

/// Proxies requests to a load balancer listener through a VPC link.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpAlbIntegration {
    id: String,
    listener_arn: Value,
    vpc_link_id: Value,
}

impl HttpAlbIntegration {
    /// Forwards every method to `listener` over `vpc_link`.
    #[must_use]
    pub fn new(id: impl Into<String>, listener: &ApplicationListener, vpc_link: &VpcLink) -> Self {
        Self {
            id: id.into(),
            listener_arn: listener.listener_arn(),
            vpc_link_id: vpc_link.vpc_link_id(),
        }
    }

    fn properties(&self, api_id: Value) -> Value {
        json!({
            "ApiId": api_id,
            "ConnectionId": self.vpc_link_id,
            "ConnectionType": "VPC_LINK",
            "IntegrationMethod": HttpMethod::Any.as_str(),
            "IntegrationType": "HTTP_PROXY",
            "IntegrationUri": self.listener_arn,
            "PayloadFormatVersion": PAYLOAD_FORMAT_VERSION,
        })
    }
}

/// Properties of an [`HttpApi`].
#[derive(Debug, Clone, Default)]
pub struct HttpApiProps<'a> {
    /// API name; the construct id when `None`.
    pub api_name: Option<String>,
    /// Custom domain to map the default stage to.
    pub default_domain_mapping: Option<&'a DomainName>,
}

/// An HTTP API with an auto-deployed `$default` stage.
#[derive(Debug, Clone)]
pub struct HttpApi {
    path: ConstructPath,
    id: LogicalId,
    stage: LogicalId,
    integrations: BTreeMap<String, LogicalId>,
    route_keys: Vec<String>,
}

impl HttpApi {
    /// Declares the API, its default stage, and the domain mapping if one
    /// is given.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is already used.
    pub fn new(stack: &mut Stack, id: &str, props: &HttpApiProps<'_>) -> Result<Self> {
        let path = ConstructPath::root(id);
        let name = props.api_name.clone().unwrap_or_else(|| id.to_owned());
        let api_id = stack.add_resource(
            &path.child("Resource"),
            CfnResource::new("AWS::ApiGatewayV2::Api").with_properties(json!({
                "Name": name,
                "ProtocolType": "HTTP",
            })),
        )?;
        let stage_path = path.child("DefaultStage");
        let stage = stack.add_resource(
            &stage_path.child("Resource"),
            CfnResource::new("AWS::ApiGatewayV2::Stage").with_properties(json!({
                "ApiId": intrinsic::reference(&api_id),
                "AutoDeploy": true,
                "StageName": DEFAULT_STAGE_NAME,
            })),
        )?;
        if let Some(domain) = props.default_domain_mapping {
            let mut mapping = CfnResource::new("AWS::ApiGatewayV2::ApiMapping").with_properties(json!({
                "ApiId": intrinsic::reference(&api_id),
                "DomainName": intrinsic::reference(domain.logical_id()),
                "Stage": DEFAULT_STAGE_NAME,
            }));
            mapping.add_dependency(&stage);
            let _ = stack.add_resource(&stage_path.child("ApiMapping").child("Resource"), mapping)?;
        }
        tracing::info!(stack = stack.name(), api = %api_id, name = %name, "declared HTTP API");
        Ok(Self {
            path,
            id: api_id,
            stage,
            integrations: BTreeMap::new(),
            route_keys: Vec::new(),
        })
    }

    /// Logical id of the API.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.id
    }

    /// Logical id of the default stage.
    #[must_use]
    pub const fn default_stage(&self) -> &LogicalId {
        &self.stage
    }

    /// `Ref` to the API, i.e. its id.
    #[must_use]
    pub fn api_id(&self) -> Value {
        intrinsic::reference(&self.id)
    }

    /// `Fn::GetAtt ApiEndpoint` of the API.
    #[must_use]
    pub fn api_endpoint(&self) -> Value {
        intrinsic::get_att(&self.id, "ApiEndpoint")
    }

    /// Route keys declared so far, e.g. `ANY /{proxy+}`.
    #[must_use]
    pub fn route_keys(&self) -> &[String] {
        &self.route_keys
    }

    /// Routes `methods` on `path` to `integration`. An empty method list
    /// means `ANY`.
    ///
    /// The integration is declared once per API and shared by every route
    /// that uses it.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not start with `/`, if a route key
    /// is already taken, or if a path is already used.
    pub fn add_routes(
        &mut self,
        stack: &mut Stack,
        path: &str,
        methods: &[HttpMethod],
        integration: &HttpAlbIntegration,
    ) -> Result<Vec<LogicalId>> {
        if !path.starts_with('/') {
            return Err(EdgestackError::config(format!(
                "route path \"{path}\" must start with '/'"
            )));
        }
        let methods = if methods.is_empty() { &[HttpMethod::Any][..] } else { methods };
        for method in methods {
            let key = route_key(*method, path);
            if self.route_keys.contains(&key) {
                return Err(EdgestackError::config(format!(
                    "API {} already has a route for {key}",
                    self.path
                )));
            }
        }

        let integration_id = self.integration(stack, integration)?;
        let mut routes = Vec::with_capacity(methods.len());
        for method in methods {
            let key = route_key(*method, path);
            let segment = format!("{}{}", method.as_str(), path.replace('/', "--"));
            let route = stack.add_resource(
                &self.path.child(segment).child("Resource"),
                CfnResource::new("AWS::ApiGatewayV2::Route").with_properties(json!({
                    "ApiId": self.api_id(),
                    "AuthorizationType": "NONE",
                    "RouteKey": key,
                    "Target": intrinsic::join("", vec![json!("integrations/"), intrinsic::reference(&integration_id)]),
                })),
            )?;
            tracing::debug!(api = %self.id, route = %route, key = %key, "declared route");
            self.route_keys.push(key);
            routes.push(route);
        }
        Ok(routes)
    }

    fn integration(&mut self, stack: &mut Stack, integration: &HttpAlbIntegration) -> Result<LogicalId> {
        if let Some(existing) = self.integrations.get(&integration.id) {
            return Ok(existing.clone());
        }
        let declared = stack.add_resource(
            &self.path.child(integration.id.as_str()).child("Resource"),
            CfnResource::new("AWS::ApiGatewayV2::Integration").with_properties(integration.properties(self.api_id())),
        )?;
        let _ = self.integrations.insert(integration.id.clone(), declared.clone());
        Ok(declared)
    }
}

fn route_key(method: HttpMethod, path: &str) -> String {
    format!("{} {path}", method.as_str())
}
