//! The service stack: a Fargate service published through an HTTP API.

use edgestack_common::config::StageContext;
use edgestack_common::error::{EdgestackError, Result};
use edgestack_common::types::{Hostname, LogicalId};
use edgestack_constructs::acm::ImportedCertificate;
use edgestack_constructs::apigatewayv2::{
    DomainName, EndpointType, HttpAlbIntegration, HttpApi, HttpApiProps, HttpMethod, VpcLink,
};
use edgestack_constructs::ec2::{SubnetConfiguration, SubnetSelection, SubnetType, Vpc, VpcProps};
use edgestack_constructs::ecs::{
    AwsLogDriver, Cluster, ContainerDefinitionOptions, ContainerImage, FargateService,
    FargateServiceProps, FargateTaskDefinition, FargateTaskDefinitionProps, PortMapping,
};
use edgestack_constructs::elbv2::{ApplicationLoadBalancer, ApplicationLoadBalancerProps};
use edgestack_constructs::route53::{ARecord, ARecordProps, AliasTarget, RecordTarget};
use edgestack_synth::context::HostedZone;
use edgestack_synth::stack::{Stack, StackProps};
use serde_json::json;

use crate::certificate::IssuedCertificate;

/// Name of the HTTP API.
pub const API_NAME: &str = "FargateHttpApi";

/// Name of the VPC link between the API and the load balancer.
pub const VPC_LINK_NAME: &str = "VpcLinkToALB";

/// Port the application listens on inside its container.
pub const CONTAINER_PORT: u16 = 3000;

/// Port the load balancer listens on.
pub const LISTENER_PORT: u16 = 80;

/// Catch-all route path.
pub const PROXY_PATH: &str = "/{proxy+}";

const CONTAINER_NAME: &str = "MyContainer";
const CONTAINER_MEMORY_MIB: u32 = 512;
const CONTAINER_CPU: u32 = 256;
const LOG_STREAM_PREFIX: &str = "my-app";

/// Inputs of the service stack.
#[derive(Debug, Clone)]
pub struct ServiceStackProps<'a> {
    /// Certificate for the service hostname. Required.
    pub certificate: &'a IssuedCertificate,
    /// Zone the alias record is created in.
    pub zone: &'a HostedZone,
    /// Image the service runs.
    pub image: ContainerImage,
}

/// Stack running the service, deployed to the service region.
#[derive(Debug, Clone)]
pub struct ServiceStack {
    stack: Stack,
    hostname: Hostname,
    listener: LogicalId,
    api: LogicalId,
    alias_record: LogicalId,
}

impl ServiceStack {
    /// Stack name for `stage`.
    #[must_use]
    pub fn stack_name(stage: &str) -> String {
        format!("RestAPIStack-{stage}")
    }

    /// Declares the network, cluster, task, service, load balancer, VPC
    /// link, custom domain, HTTP API, route and alias record.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate was issued for another hostname,
    /// if the certificate cannot be imported across the two environments,
    /// or if any construct rejects its inputs.
    pub fn new(ctx: &StageContext, props: ServiceStackProps<'_>) -> Result<Self> {
        let hostname = ctx.hostname();
        if props.certificate.domain_name() != hostname {
            return Err(EdgestackError::config(format!(
                "certificate was issued for {}, not {hostname}",
                props.certificate.domain_name()
            )));
        }
        let mut stack = Stack::new(
            Self::stack_name(ctx.stage()),
            StackProps {
                env: ctx.service_env(),
                cross_region_references: true,
                description: Some(format!("Fargate service behind an HTTP API at {hostname}")),
            },
        )?;

        let vpc = Vpc::new(
            &mut stack,
            "Vpc",
            &VpcProps {
                max_azs: 2,
                subnet_configuration: vec![SubnetConfiguration::public()],
                ..VpcProps::default()
            },
        )?;
        let cluster = Cluster::new(&mut stack, "Cluster", &vpc)?;

        let mut task_definition =
            FargateTaskDefinition::new(&mut stack, "TaskDef", &FargateTaskDefinitionProps::default())?;
        let _ = task_definition.add_container(
            &mut stack,
            CONTAINER_NAME,
            ContainerDefinitionOptions {
                memory_limit_mib: Some(CONTAINER_MEMORY_MIB),
                cpu: Some(CONTAINER_CPU),
                logging: Some(AwsLogDriver::new(LOG_STREAM_PREFIX)),
                ..ContainerDefinitionOptions::new(props.image)
            },
        )?;
        task_definition.add_port_mappings(&mut stack, CONTAINER_NAME, &[PortMapping::tcp(CONTAINER_PORT)])?;

        let public = SubnetSelection::Type(SubnetType::Public);
        let mut service = FargateService::new(
            &mut stack,
            "FargateService",
            &cluster,
            &task_definition,
            FargateServiceProps {
                assign_public_ip: true,
                vpc_subnets: public,
                ..FargateServiceProps::default()
            },
        )?;

        let mut load_balancer = ApplicationLoadBalancer::new(
            &mut stack,
            "ALB",
            &vpc,
            ApplicationLoadBalancerProps {
                internet_facing: false,
                ..ApplicationLoadBalancerProps::default()
            },
        )?;
        let mut listener = load_balancer.add_listener(&mut stack, "Listener", LISTENER_PORT, true)?;
        let _ = listener.add_targets(&mut stack, "Target", LISTENER_PORT, &mut [&mut service])?;

        let vpc_link = VpcLink::new(&mut stack, "VpcLink", &vpc, VPC_LINK_NAME, public)?;

        let certificate = ImportedCertificate::from_certificate_arn(stack.import(props.certificate.reference())?);
        let domain = DomainName::new(
            &mut stack,
            "ApiDomainName",
            hostname,
            certificate.certificate_arn().clone(),
            EndpointType::Edge,
        )?;

        let mut api = HttpApi::new(
            &mut stack,
            &format!("{}HttpApi", ctx.stage()),
            &HttpApiProps {
                api_name: Some(API_NAME.into()),
                default_domain_mapping: Some(&domain),
            },
        )?;
        let integration = HttpAlbIntegration::new("HttpAlbIntegration", &listener, &vpc_link);
        let _ = api.add_routes(&mut stack, PROXY_PATH, &[HttpMethod::Any], &integration)?;

        let record = ARecord::new(
            &mut stack,
            "ApiAliasRecord",
            ARecordProps {
                zone: props.zone,
                record_name: hostname.clone(),
                target: RecordTarget::Alias(AliasTarget::api_gateway_v2_domain(&domain)),
                ttl: None,
            },
        )?;

        stack.add_output(
            "ApiUrl",
            json!(format!("https://{hostname}")),
            Some("Public URL of the HTTP API".into()),
        )?;
        stack.add_output(
            "ApiEndpoint",
            api.api_endpoint(),
            Some("Default execute-api endpoint of the HTTP API".into()),
        )?;
        stack.add_output(
            "LoadBalancerDnsName",
            load_balancer.dns_name(),
            Some("Internal DNS name of the load balancer".into()),
        )?;

        tracing::info!(
            stack = stack.name(),
            env = %stack.env(),
            hostname = %hostname,
            resources = stack.resources().count(),
            "built service stack"
        );
        Ok(Self {
            stack,
            hostname: hostname.clone(),
            listener: listener.logical_id().clone(),
            api: api.logical_id().clone(),
            alias_record: record.logical_id().clone(),
        })
    }

    /// The underlying stack.
    #[must_use]
    pub const fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Hostname the service answers on.
    #[must_use]
    pub const fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    /// Logical id of the load balancer listener.
    #[must_use]
    pub const fn listener(&self) -> &LogicalId {
        &self.listener
    }

    /// Logical id of the HTTP API.
    #[must_use]
    pub const fn api(&self) -> &LogicalId {
        &self.api
    }

    /// Logical id of the alias record.
    #[must_use]
    pub const fn alias_record(&self) -> &LogicalId {
        &self.alias_record
    }

    /// Releases the stack for adding to an app.
    #[must_use]
    pub fn into_stack(self) -> Stack {
        self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateStack;

    fn ctx(stage: &str) -> StageContext {
        StageContext::new(stage)
            .expect("ctx")
            .with_account("123456789012")
            .with_region("eu-west-1")
    }

    fn zone() -> HostedZone {
        HostedZone::new("/hostedzone/Z0123", "slippys.cool")
    }

    fn build(stage: &str) -> (CertificateStack, ServiceStack) {
        let ctx = ctx(stage);
        let zone = zone();
        let cert = CertificateStack::new(&ctx, &zone).expect("certificate");
        let service = ServiceStack::new(
            &ctx,
            ServiceStackProps {
                certificate: cert.certificate(),
                zone: &zone,
                image: ContainerImage::from_registry("node:20"),
            },
        )
        .expect("service");
        (cert, service)
    }

    #[test]
    fn service_stack_is_named_per_stage() {
        let (_, service) = build("dev");
        assert_eq!(service.stack().name(), "RestAPIStack-dev");
        assert_eq!(service.stack().env().region.as_deref(), Some("eu-west-1"));
        assert_eq!(service.hostname().as_str(), "poc-fargate-ecs.dev.slippys.cool");
    }

    #[test]
    fn certificate_for_another_hostname_is_rejected() {
        let (cert, _) = build("prod");
        let zone = zone();
        let err = ServiceStack::new(
            &ctx("dev"),
            ServiceStackProps {
                certificate: cert.certificate(),
                zone: &zone,
                image: ContainerImage::from_registry("node:20"),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("certificate was issued for"), "got: {err}");
    }

    #[test]
    fn certificate_crosses_regions_as_parameter() {
        let (_, service) = build("dev");
        let imports = service.stack().imports();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].reference.producer(), "Certificate-dev");
    }

    #[test]
    fn stack_declares_one_of_each_front_door_resource() {
        let (_, service) = build("dev");
        let stack = service.stack();
        for resource_type in [
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            "AWS::ElasticLoadBalancingV2::Listener",
            "AWS::ElasticLoadBalancingV2::TargetGroup",
            "AWS::ApiGatewayV2::VpcLink",
            "AWS::ApiGatewayV2::DomainName",
            "AWS::ApiGatewayV2::Api",
            "AWS::ApiGatewayV2::Route",
            "AWS::ApiGatewayV2::Integration",
            "AWS::Route53::RecordSet",
            "AWS::ECS::Service",
        ] {
            assert_eq!(stack.resources_of_type(resource_type).count(), 1, "{resource_type}");
        }
        assert!(stack.to_template().is_ok());
    }

    #[test]
    fn outputs_expose_custom_and_default_endpoints() {
        let (_, service) = build("dev");
        let template = service.stack().to_template().expect("template");
        assert_eq!(template.outputs["ApiUrl"].value, json!("https://poc-fargate-ecs.dev.slippys.cool"));
        assert_eq!(
            template.outputs["ApiEndpoint"].value,
            json!({"Fn::GetAtt": [service.api().as_str(), "ApiEndpoint"]})
        );
        assert!(template.outputs["ApiEndpoint"].export.is_none());
    }

    #[test]
    fn api_is_named_after_stage() {
        let (_, service) = build("qa");
        assert!(service.api().as_str().starts_with("qaHttpApi"));
        let api = service.stack().resource(service.api()).expect("api");
        assert_eq!(api.property("Name"), Some(&json!(API_NAME)));
    }
}
